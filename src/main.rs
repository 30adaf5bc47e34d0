//! posture-node firmware entry point.
//!
//! Hardware: nRF52840 + S140 SoftDevice, Si7021 on I²C, flex sensor on
//! AIN2 behind a tilt switch, SSD1306 OLED, two buttons.
//!
//! All decisions happen in the dispatch task, which owns the [`Node`].
//! Everything else is a hardware task that raises signals or posts events.

#![no_std]
#![no_main]

use core::mem;

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{AnyPin, Input, Level, Output, OutputDrive, Pin, Pull};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::peripherals::{TWISPI0, TWISPI1};
use embassy_nrf::saadc::{self, ChannelConfig, Saadc};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, peripherals};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use posture_node::ble::server::SensorServer;
use posture_node::ble::{central, link, server};
use posture_node::config::DEVICE_NAME;
use posture_node::platform::NrfPlatform;
use posture_node::sensor::si7021::Si7021;
use posture_node::sensor::tasks;
use posture_node::ui::buttons::{self, ButtonSignals};
use posture_node::ui::display::{self, Display};
use posture_node::{Node, NodeConfig, Role, AGGREGATOR};

#[cfg(not(feature = "peer"))]
const ROLE: Role = Role::Sensor;
#[cfg(feature = "peer")]
const ROLE: Role = Role::Peer;

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<TWISPI0>;
    SPIM1_SPIS1_TWIM1_TWIS1_SPI1_TWI1 => twim::InterruptHandler<TWISPI1>;
});

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn server_task(sd: &'static Softdevice, server: &'static SensorServer) -> ! {
    server::server_task(sd, server).await
}

#[embassy_executor::task]
async fn central_task(sd: &'static Softdevice) -> ! {
    central::central_task(sd).await
}

#[embassy_executor::task]
async fn ack_watchdog_task() -> ! {
    link::ack_watchdog_task().await
}

#[embassy_executor::task]
async fn ticker_task() -> ! {
    tasks::ticker_task().await
}

#[embassy_executor::task]
async fn delay_task() -> ! {
    tasks::delay_task().await
}

#[embassy_executor::task]
async fn bus_task(sensor: Si7021<Twim<'static, TWISPI0>>) -> ! {
    tasks::bus_task(sensor).await
}

#[embassy_executor::task]
async fn flex_task(tilt: Input<'static>, adc: Saadc<'static, 1>) -> ! {
    tasks::flex_task(tilt, adc).await
}

#[embassy_executor::task(pool_size = 2)]
async fn button_task(pin: AnyPin, signals: ButtonSignals) -> ! {
    buttons::button_task(pin, signals).await
}

#[embassy_executor::task]
async fn display_task(display: Display<Twim<'static, TWISPI1>>) -> ! {
    display::display_task(display).await
}

/// Signals take priority over events: an open is always handled before
/// the passkey or CCCD events of that connection.
#[embassy_executor::task]
async fn dispatch_task(mut node: Node<NrfPlatform>) -> ! {
    node.boot();
    loop {
        match select(AGGREGATOR.wait(), link::EVENTS.receive()).await {
            Either::First(signals) => node.dispatch(signals),
            Either::Second(event) => node.handle(event),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Setup
// ═══════════════════════════════════════════════════════════════════════════

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 1,
            central_sec_count: 1,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            // SAFETY: an all-zero security mode is "no write access".
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("posture-node starting as {}", ROLE);

    // SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);
    interrupt::SAADC.set_priority(Priority::P3);
    interrupt::SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0.set_priority(Priority::P3);
    interrupt::SPIM1_SPIS1_TWIM1_TWIS1_SPI1_TWI1.set_priority(Priority::P3);

    let sd = Softdevice::enable(&softdevice_config());

    static SERVER: StaticCell<SensorServer> = StaticCell::new();
    let server: Option<&'static SensorServer> = match ROLE {
        Role::Sensor => Some(SERVER.init(unwrap!(SensorServer::new(sd)))),
        Role::Peer => None,
    };
    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(softdevice_task(sd)));

    // Link
    match server {
        Some(server) => unwrap!(spawner.spawn(server_task(sd, server))),
        None => unwrap!(spawner.spawn(central_task(sd))),
    }
    unwrap!(spawner.spawn(ack_watchdog_task()));

    // Buttons
    unwrap!(spawner.spawn(button_task(p.P0_11.degrade(), buttons::BUTTON_A)));
    unwrap!(spawner.spawn(button_task(p.P0_12.degrade(), buttons::BUTTON_B)));

    // Display
    let display_bus = Twim::new(p.TWISPI1, Irqs, p.P0_28, p.P0_29, twim::Config::default());
    match display::init(display_bus) {
        Ok(oled) => unwrap!(spawner.spawn(display_task(oled))),
        Err(e) => warn!("display unavailable ({}), running headless", e),
    }

    // Sensors
    let sensor_enable = Output::new(p.P0_03, Level::Low, OutputDrive::Standard);
    if ROLE == Role::Sensor {
        let sensor_bus = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
        unwrap!(spawner.spawn(bus_task(Si7021::new(sensor_bus))));
        unwrap!(spawner.spawn(delay_task()));
        unwrap!(spawner.spawn(ticker_task()));

        let tilt = Input::new(p.P0_24, Pull::Up);
        let flex = ChannelConfig::single_ended(p.P0_04);
        let adc = Saadc::new(p.SAADC, Irqs, saadc::Config::default(), [flex]);
        unwrap!(spawner.spawn(flex_task(tilt, adc)));
    }

    let node = Node::new(
        NodeConfig::for_role(ROLE),
        NrfPlatform::new(sensor_enable, server),
    );
    unwrap!(spawner.spawn(dispatch_task(node)));
}
