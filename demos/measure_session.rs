//! Measurement session example
//!
//! Connects to a MySming device, enables heart-rate notifications and runs a
//! measurement until Ctrl+C.
//!
//! Run with: cargo run --example measure_session -- <device-address>

use mysming_ble::{
    BleDriver, DriverConfig, DriverEvent, Error, Result, HEART_RATE_MEASUREMENT,
    LSM330_TEMP_SAMPLE,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt().with_env_filter("info").init();

    let address = std::env::args().nth(1).ok_or_else(|| Error::DeviceNotFound {
        address: "<none given>".to_string(),
    })?;

    println!("Measure Session");
    println!("===============\n");

    let driver = BleDriver::platform(DriverConfig::default());
    let mut events = driver.subscribe();

    driver.initialize().await?;
    println!("Connecting to {}...", address);
    driver.connect(&address).await?;

    // Wait for the attribute table before touching characteristics
    let discovered = tokio::time::timeout(Duration::from_secs(15), async {
        while let Ok(event) = events.recv().await {
            if event == DriverEvent::ServicesDiscovered {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    if !discovered {
        println!("Service discovery did not complete.");
        driver.close().await;
        return Ok(());
    }

    if let Some(services) = driver.list_services() {
        for service in services {
            println!("Service {}", service.uuid);
            for characteristic in service.characteristics {
                println!(
                    "  {} {:?}",
                    characteristic.id.characteristic, characteristic.properties
                );
            }
        }
    }

    driver.set_notification(HEART_RATE_MEASUREMENT, true).await?;
    driver.start_measurement()?;

    println!("\nMeasuring. Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
            event = events.recv() => match event {
                Ok(DriverEvent::DataAvailable { characteristic, value }) => {
                    let label = if characteristic == HEART_RATE_MEASUREMENT {
                        "Heart rate"
                    } else if characteristic == LSM330_TEMP_SAMPLE {
                        "Temperature"
                    } else {
                        "Data"
                    };
                    println!("{:<12} {}", label, value.unwrap_or_else(|| "--".to_string()));
                }
                Ok(DriverEvent::Disconnected) => {
                    println!("Device disconnected.");
                    break;
                }
                Ok(other) => println!("{:?}", other),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    println!("Missed {} events", n);
                }
                Err(_) => break,
            }
        }
    }

    if driver.stop_measurement().is_ok() {
        // Let the end sequence switch the sensors off
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    driver.close().await;

    Ok(())
}
