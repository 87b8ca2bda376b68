use embassy_net::Runner;
use embassy_time::{Duration, Timer};
use envlog_core::config::InternetConfig;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState};
use log::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Keep the station connected, reconnecting whenever the link drops.
#[embassy_executor::task]
pub async fn connection_task(
    mut controller: WifiController<'static>,
    internet: InternetConfig<'static>,
) {
    info!("Wi-Fi connection task started");

    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wi-Fi disconnected");
            Timer::after(RECONNECT_DELAY).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(internet.ssid.into())
                    .with_password(internet.password.into()),
            );

            if let Err(e) = controller.set_config(&client_config) {
                warn!("Failed to set Wi-Fi configuration: {:?}", e);
            }

            match controller.start_async().await {
                Ok(_) => info!("Wi-Fi started"),
                Err(e) => warn!("Failed to start Wi-Fi: {:?}", e),
            }
        }

        info!("Connecting to {}", internet.ssid);
        match controller.connect_async().await {
            Ok(_) => info!("Wi-Fi connected"),
            Err(e) => {
                warn!("Failed to connect to Wi-Fi: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
