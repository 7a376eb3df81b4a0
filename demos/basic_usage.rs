//! Example usage of range tables.
//!
//! Stores readings per sensor, keyed by timestamp, then scans a time window.

use redb_range_table::{Db, DbConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db = Db::create("basic_usage.redb", DbConfig::default())?;

    // Sensor name -> timestamp -> reading
    let readings = db.get_table::<String, u64, f64>("readings")?;

    println!("Writing readings...");
    for (sensor, timestamp, reading) in [
        ("boiler", 1_000u64, 71.5f64),
        ("boiler", 2_000, 72.0),
        ("boiler", 3_000, 74.25),
        ("boiler", 4_000, 73.0),
        ("intake", 1_500, 12.0),
    ] {
        readings.put(sensor.to_string(), timestamp, reading)?;
    }

    let latest = readings.get("boiler".to_string(), 4_000u64)?;
    println!("boiler @ 4000: {:?}", latest);

    println!("boiler between 2000 and 3000:");
    for entry in readings.range_between("boiler".to_string(), 2_000u64, 3_000u64)? {
        let (sensor, timestamp, reading) = entry?;
        println!("  {} @ {}: {}", sensor, timestamp, reading);
    }

    println!("boiler, newest first:");
    for entry in readings.range("boiler".to_string())?.rev().take(2) {
        let (_, timestamp, reading) = entry?;
        println!("  {}: {}", timestamp, reading);
    }

    readings.delete("intake".to_string(), 1_500u64)?;
    println!(
        "intake entries after delete: {}",
        readings.range("intake".to_string())?.count()
    );

    db.delete_table("readings")?;
    Ok(())
}
