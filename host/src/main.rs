use log::{error, info, warn};
use meshwork_host::config::RunMode;
use meshwork_host::{
    Controller, DeliveryTestDriver, DeliveryTestLoop, Dispatcher, DispatchLoop, DriverSettings,
    HandshakeLoop, HostConfig, StopHandle, StreamTransport, TestSummary, Transport,
};
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = HostConfig::from_env()?;
    let mode = RunMode::from_env()?;
    let transport_address =
        std::env::var("MESHWORK_TRANSPORT_ADDR").unwrap_or_else(|_| "127.0.0.1:7000".to_string());

    info!(
        "Meshwork host starting in {:?} mode, node at {}",
        mode, transport_address
    );
    let transport = Arc::new(StreamTransport::connect(&transport_address, CONNECT_TIMEOUT).await?);
    let dispatcher = Dispatcher::new(Arc::clone(&transport), config.console_read_timeout);
    let config = Arc::new(config);

    match mode {
        RunMode::Configure => {
            let dispatch_loop = HandshakeLoop::new(dispatcher, config.as_ref().clone());
            let dispatch_loop = run_to_completion(transport, config, dispatch_loop).await?;
            match dispatch_loop.into_outcome() {
                Some(Ok(report)) => {
                    info!("Node serial {}", hex::encode(&report.serial));
                    Ok(())
                }
                Some(Err(e)) => Err(e.into()),
                None => Err("handshake did not run".into()),
            }
        }
        RunMode::Perf => {
            let driver = DeliveryTestDriver::new(dispatcher, DriverSettings::from(config.as_ref()));
            let summary = TestSummary::new(config.tests.iter().cloned());
            let dispatch_loop = DeliveryTestLoop::new(driver, summary);
            let dispatch_loop =
                run_to_completion(transport, Arc::clone(&config), dispatch_loop).await?;
            let metrics = dispatch_loop.driver().dispatcher().metrics().clone();
            info!("Dispatch metrics: {}", serde_json::to_string(&metrics)?);

            if let Some(path) = &config.results_path {
                let summary = dispatch_loop.into_summary();
                std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
                info!("Wrote test results to {}", path.display());
            }
            Ok(())
        }
    }
}

// Start the loop, let Ctrl-C request a cooperative stop, and wait for the
// loop to finish on its own.
async fn run_to_completion<T: Transport, L: DispatchLoop>(
    transport: Arc<T>,
    config: Arc<HostConfig>,
    dispatch_loop: L,
) -> Result<L, Box<dyn std::error::Error>> {
    let mut controller = Controller::builder()
        .transport(transport)
        .config(config)
        .dispatch_loop(dispatch_loop)
        .start()
        .await?;

    if let Some(stop) = controller.stop_handle() {
        tokio::spawn(stop_on_ctrl_c(stop));
    }
    Ok(controller.wait().await?)
}

async fn stop_on_ctrl_c(stop: StopHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, stopping after the current exchange");
            stop.request_stop();
        }
        Err(e) => error!("Failed to listen for interrupt: {}", e),
    }
}
