// Loopback demo: one peripheral counting, one central printing what it sees

use crate::config::Config;
use anyhow::{Context, Result};
use blecounter_core::{
    spawn_central, spawn_peripheral, AirEndpoints, CentralController, ChannelListener,
    ListenerEvent, PeripheralClient, PeripheralController, PeripheralSnapshot, SimulatedAir,
};
use colored::*;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const POLL_ATTEMPTS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    pub ticks: u32,
    pub interval: Duration,
    pub start: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoReport {
    /// Every counter value the central received, in order
    pub values: Vec<i64>,
    pub last_value: Option<i64>,
}

pub async fn run(config: &Config, options: DemoOptions) -> Result<DemoReport> {
    let AirEndpoints {
        air,
        central,
        central_events,
        peripheral,
        peripheral_events,
    } = SimulatedAir::pair();

    let (listener, mut updates) = ChannelListener::channel();
    let (central_client, central_task) = spawn_central(
        CentralController::new(central, listener, config.central_config()),
        central_events,
    );
    let (peripheral_client, peripheral_task) = spawn_peripheral(
        PeripheralController::new(peripheral, config.peripheral_config()),
        peripheral_events,
    );

    println!("  {} Peripheral {}", "•".bright_blue(), air.peripheral_handle());
    println!("  {} Central    {}", "•".bright_blue(), air.central_handle());

    // Requested before power-on; the central parks it until the radio is up
    central_client.connect().await?;
    air.power_on();
    wait_for_peripheral(&peripheral_client, |s| s.published)
        .await
        .context("Service was never published")?;
    peripheral_client.start_advertising().await?;

    loop {
        if next_event(&mut updates).await? == ListenerEvent::Connected(true) {
            break;
        }
    }
    wait_for_peripheral(&peripheral_client, |s| s.subscribers > 0)
        .await
        .context("Central never subscribed")?;

    let mut report = DemoReport::default();
    peripheral_client.set_counter(options.start).await?;
    report.values.push(next_value(&mut updates).await?);

    for _ in 0..options.ticks {
        sleep(options.interval).await;
        peripheral_client.increment().await?;
        report.values.push(next_value(&mut updates).await?);
    }

    central_client.shutdown().await?;
    peripheral_client.shutdown().await?;
    let central = central_task.await.context("Central task panicked")?;
    peripheral_task.await.context("Peripheral task panicked")?;

    report.last_value = central.last_value();
    Ok(report)
}

fn print_event(event: &ListenerEvent) {
    match event {
        ListenerEvent::Scanning(true) => println!("  {} Scanning", "🔍".bright_yellow()),
        ListenerEvent::Scanning(false) => println!("  {} Scan stopped", "🔍".dimmed()),
        ListenerEvent::Connected(true) => println!("  {} Connected", "✓".green()),
        ListenerEvent::Connected(false) => println!("  {} Disconnected", "✗".red()),
        ListenerEvent::Value(value) => {
            println!("  {} counter = {}", "→".bright_cyan(), value.to_string().bold())
        }
    }
}

async fn next_event(updates: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> Result<ListenerEvent> {
    let event = timeout(EVENT_TIMEOUT, updates.recv())
        .await
        .context("Timed out waiting for the central")?
        .context("Central listener closed")?;
    print_event(&event);
    Ok(event)
}

async fn next_value(updates: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> Result<i64> {
    loop {
        if let ListenerEvent::Value(value) = next_event(updates).await? {
            return Ok(value);
        }
    }
}

async fn wait_for_peripheral<F>(client: &PeripheralClient, check: F) -> Result<()>
where
    F: Fn(&PeripheralSnapshot) -> bool,
{
    for _ in 0..POLL_ATTEMPTS {
        if check(&client.snapshot().await?) {
            return Ok(());
        }
        sleep(POLL_INTERVAL).await;
    }
    anyhow::bail!("Timed out waiting for the peripheral")
}
