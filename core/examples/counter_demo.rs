// Demo: Counter exchange over the loopback radio
//
// Runs a peripheral that counts once per tick and a central that subscribes
// to it, both as tokio tasks. Prints every value the central receives.

use blecounter_core::{
    spawn_central, spawn_peripheral, AirEndpoints, CentralConfig, CentralController,
    ChannelListener, ListenerEvent, PeripheralConfig, PeripheralController, SimulatedAir,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("📶 BLE Counter Demo");
    println!("===================\n");

    let AirEndpoints {
        air,
        central,
        central_events,
        peripheral,
        peripheral_events,
    } = SimulatedAir::pair();
    println!("   Peripheral: {}", air.peripheral_handle());
    println!("   Central:    {}\n", air.central_handle());

    let (listener, mut updates) = ChannelListener::channel();
    let (central_client, central_task) = spawn_central(
        CentralController::new(central, listener, CentralConfig::default()),
        central_events,
    );
    let (peripheral_client, peripheral_task) = spawn_peripheral(
        PeripheralController::new(peripheral, PeripheralConfig::default()),
        peripheral_events,
    );

    // Asked before the radio is up; runs once it powers on
    central_client.connect().await?;
    air.power_on();
    tokio::time::sleep(Duration::from_millis(100)).await;
    peripheral_client.start_advertising().await?;

    let mut ticks = 0;
    while ticks < 5 {
        tokio::select! {
            Some(event) = updates.recv() => match event {
                ListenerEvent::Scanning(scanning) => println!("🔍 scanning: {}", scanning),
                ListenerEvent::Connected(connected) => println!("🔗 connected: {}", connected),
                ListenerEvent::Value(value) => println!("✓ counter = {}", value),
            },
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                let value = peripheral_client.increment().await?;
                println!("   peripheral counted {}", value);
                ticks += 1;
            }
        }
    }

    // Let the last notification drain
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(ListenerEvent::Value(value)) = updates.try_recv() {
        println!("✓ counter = {}", value);
    }

    central_client.shutdown().await?;
    peripheral_client.shutdown().await?;
    let central = central_task.await?;
    println!("\nLast value seen by central: {:?}", central.last_value());
    let _ = peripheral_task.await?;

    Ok(())
}
