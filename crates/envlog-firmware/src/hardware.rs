//! Hardware initialization for the logger board
//!
//! Pin assignments follow the M5Stack CoreS3: the SD card shares SPI2 with the
//! (unused) display, the SHT40 sits on the internal I2C bus.

use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::SdCard;
use envlog_core::app_state::LoggerContext;
use envlog_core::storage::sd_card::{CardDetect, FatClock, SdCardVolume};
use envlog_core::time_sync::WallClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};

pub type SdSpiDevice = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
pub type SdVolume = SdCardVolume<SdCard<SdSpiDevice, Delay>, FatClock<'static, WallClock>>;
pub type SdMedium = CardDetect<Input<'static>>;

/// The concrete logger state shared by every task.
pub type Context = LoggerContext<'static, SdVolume, SdMedium>;

#[cfg(feature = "sensor-sht40")]
pub type ClimateSensor = envlog_core::sensors::Sht40Sensor<I2c<'static, Async>>;

/// Initialize the I2C bus hardware
///
/// Creates the I2C peripheral with proper configuration
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> I2c<'static, Async> {
    I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))
        .expect("Failed to configure I2C bus")
        .with_sda(sda)
        .with_scl(scl)
        .into_async()
}

/// Create the SPI device for the SD card
///
/// Cards must be initialized at 400 kHz or less; the bus is left at that
/// rate since a log line every few seconds needs no more.
pub fn create_sd_spi(
    spi2: esp_hal::peripherals::SPI2<'static>,
    sck: esp_hal::peripherals::GPIO36<'static>,
    mosi: esp_hal::peripherals::GPIO37<'static>,
    miso: esp_hal::peripherals::GPIO35<'static>,
    cs: esp_hal::peripherals::GPIO4<'static>,
) -> SdSpiDevice {
    let spi_bus = Spi::new(spi2, SpiConfig::default().with_frequency(Rate::from_khz(400)))
        .expect("Failed to configure SD card SPI bus")
        .with_sck(sck)
        .with_mosi(mosi)
        .with_miso(miso);

    let cs = Output::new(cs, Level::High, OutputConfig::default());

    ExclusiveDevice::new(spi_bus, cs, Delay).expect("Failed to create SD card SPI device")
}

/// Initialize SPI hardware for the SD card
///
/// Wraps the SPI device with a delay implementation to create an SD card
/// instance ready for use.
pub fn init_spi_hardware(sd_card_spi: SdSpiDevice, delay: Delay) -> SdCard<SdSpiDevice, Delay> {
    SdCard::new(sd_card_spi, delay)
}

/// Card-detect switch of the SD slot, pulled up and shorted to ground by a card.
pub fn card_detect(pin: esp_hal::peripherals::GPIO1<'static>) -> SdMedium {
    CardDetect::active_low(Input::new(pin, InputConfig::default().with_pull(Pull::Up)))
}
