use std::sync::Arc;

use clevertouch::{ApiSession, Config, Coordinator, Event};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> clevertouch::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let session: Arc<ApiSession> = Arc::new(config.session_builder().build()?);
    if let Some(password) = &config.password {
        println!("Logging in as {}...", config.email);
        session.authenticate(password).await?;
    }

    let coordinator = Arc::new(
        Coordinator::builder(session)
            .scheduler(config.scheduler)
            .on_event(print_event)
            .on_token_rotated(|token| println!("New token (store as CLEVERTOUCH_TOKEN): {token}"))
            .build(),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!("Polling, press Ctrl-C to stop.");
    coordinator.run(cancel).await?;

    for (home_id, home) in coordinator.homes().await {
        let home = home.read().await;
        println!("{home_id} ({}): {} devices", home.label, home.devices().len());
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::TemperatureChanged {
            device_id,
            slot,
            temp: Some(temp),
            ..
        } => println!(
            "[{device_id}] {slot}: {:.1}\u{00b0}C / {:.1}\u{00b0}F",
            temp.celsius(),
            temp.fahrenheit()
        ),
        Event::HeatModeChanged { device_id, mode, .. } => println!("[{device_id}] mode: {mode}"),
        Event::DecodeFailed { device_id, reason, .. } => eprintln!("[{device_id}] skipped: {reason}"),
        other => println!("{other:?}"),
    }
}
