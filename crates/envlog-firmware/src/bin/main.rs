#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Delay, Duration, Timer};
use envlog_core::app_state::LoggerContext;
use envlog_core::config::{Config, InternetConfig};
use envlog_core::storage::sd_card::{FatClock, SdCardVolume};
use envlog_core::time_sync::WallClock;
use envlog_firmware::hardware::{self, Context};
use envlog_firmware::{http_server, sntp_client, wifi};
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::{LevelFilter, info};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

// When you are okay with using a nightly compiler it's better to use https://docs.rs/static_cell/2.1.0/static_cell/macro.make_static.html
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

#[embassy_executor::task]
async fn scheduler_task(context: &'static Context) {
    context.scheduler().run().await
}

#[cfg(feature = "sensor-sht40")]
#[embassy_executor::task]
async fn sampler_task(context: &'static Context, sensor: hardware::ClimateSensor) {
    context.sampler(sensor).run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let config = mk_static!(
        Config<'static>,
        Config {
            internet: InternetConfig {
                ssid: env!("WIFI_SSID"),
                password: env!("WIFI_PASS"),
            },
            ..Config::default()
        }
    );

    // Storage: the FAT driver stamps files from the same clock as the readings
    let clock = mk_static!(WallClock, WallClock::new());
    let clock: &'static WallClock = clock;

    let sd_spi = hardware::create_sd_spi(
        peripherals.SPI2,
        peripherals.GPIO36,
        peripherals.GPIO37,
        peripherals.GPIO35,
        peripherals.GPIO4,
    );
    let sd_card = hardware::init_spi_hardware(sd_spi, Delay);
    let volume = SdCardVolume::new(sd_card, FatClock(clock));
    let medium = hardware::card_detect(peripherals.GPIO1);

    let context: &'static Context = mk_static!(
        Context,
        LoggerContext::new(volume, medium, clock, config.logger)
    );

    info!("Logging to {}", context.log.file_name());

    // Network
    let radio_init = mk_static!(
        esp_radio::Controller<'static>,
        esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller")
    );
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<6>, StackResources::<6>::new()),
        seed,
    );

    spawner.spawn(wifi::connection_task(wifi_controller, config.internet)).ok();
    spawner.spawn(wifi::net_task(runner)).ok();
    spawner
        .spawn(sntp_client::time_sync_task(stack, context, config.time_sync))
        .ok();
    spawner
        .spawn(http_server::http_task(stack, context, config.logger.http_port))
        .ok();

    // Engine
    #[cfg(feature = "sensor-sht40")]
    {
        let i2c = hardware::create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11);
        spawner
            .spawn(sampler_task(context, hardware::ClimateSensor::new(i2c)))
            .ok();
    }
    #[cfg(not(feature = "sensor-sht40"))]
    log::warn!("Built without a sensor driver, every reading will stay zero");

    spawner.spawn(scheduler_task(context)).ok();

    loop {
        Timer::after(Duration::from_secs(60)).await;
        info!(
            "Alive, time synchronized: {}",
            context.time_sync.is_synchronized()
        );
    }
}
