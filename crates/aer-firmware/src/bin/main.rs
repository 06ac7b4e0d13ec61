#![no_std]
#![no_main]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::Timer;
use esp_hal::Async;
use esp_hal::Blocking;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx, UartTx};
use log::{error, info};
use static_cell::StaticCell;

use aer_core::config::{DEFAULT_REPORT_INTERVAL, NodeConfig};
use aer_core::measurement::PresentationSink;
use aer_core::node::Node;
use aer_core::radio::{Credentials, Region};
use aer_core::scheduler::WakeScheduler;
use aer_core::session::SessionController;
use aer_firmware::oled::Oled;
use aer_firmware::pms5003::Pms5003;
use aer_firmware::rak3172::{self, Rak3172};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

type RadioDriver = Rak3172<UartTx<'static, Blocking>>;

// Keys are MSB-first, as provisioned on the network server.
static CONFIG: NodeConfig = NodeConfig::new(
    Region::Eu868,
    Credentials::Otaa {
        dev_eui: [0xAC, 0x1F, 0x09, 0xFF, 0xFE, 0x14, 0x77, 0x97],
        app_eui: [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        app_key: [
            0x60, 0x69, 0xD2, 0x00, 0x5F, 0xF4, 0xA7, 0x4C, 0x9F, 0x29, 0x28, 0x7E, 0xAE, 0x9C,
            0x08, 0xD8,
        ],
    },
);

static SCHEDULER: WakeScheduler = WakeScheduler::new(DEFAULT_REPORT_INTERVAL);
static SESSION: StaticCell<SessionController<'static, RadioDriver>> = StaticCell::new();

#[embassy_executor::task]
async fn radio_events(
    rx: UartRx<'static, Async>,
    session: &'static SessionController<'static, RadioDriver>,
    join_led: Output<'static>,
) {
    rak3172::event_pump(rx, session, join_led).await
}

#[embassy_executor::task]
async fn report_ticker(scheduler: &'static WakeScheduler) {
    scheduler.run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("embassy initialized");

    // Join indicator: high until the network accepts us.
    let join_led = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());

    // Particulate sensor, 9600 8N1, read-only.
    let sensor_uart = Uart::new(
        peripherals.UART1,
        UartConfig::default().with_baudrate(9600),
    )
    .unwrap()
    .with_rx(peripherals.GPIO17)
    .into_async();
    let sensor = Pms5003::new(sensor_uart);

    // Status display.
    let i2c = I2c::new(peripherals.I2C0, I2cConfig::default())
        .unwrap()
        .with_sda(peripherals.GPIO8)
        .with_scl(peripherals.GPIO9);
    let mut sink = Oled::new(i2c);
    sink.render_status("booting");

    // LoRaWAN module: blocking command writer, async event reader.
    let radio_uart = Uart::new(
        peripherals.UART2,
        UartConfig::default().with_baudrate(115200),
    )
    .unwrap()
    .with_rx(peripherals.GPIO15)
    .with_tx(peripherals.GPIO16);
    let (radio_rx, radio_tx) = radio_uart.split();
    let radio_rx = radio_rx.into_async();

    let session: &'static SessionController<'static, RadioDriver> =
        &*SESSION.init(SessionController::new(
            Rak3172::new(radio_tx),
            &CONFIG,
            &SCHEDULER,
        ));

    // Stack or channel configuration failure is boot-fatal: report it and
    // halt instead of entering the main loop.
    if let Err(e) = session.initialize() {
        error!("boot aborted: {e}");
        sink.render_status("radio init failed");
        loop {
            Timer::after_secs(60).await;
        }
    }
    sink.render_status("joining network");

    spawner.spawn(radio_events(radio_rx, session, join_led)).unwrap();
    spawner.spawn(report_ticker(&SCHEDULER)).unwrap();

    let mut node = Node::new(session, &SCHEDULER, &CONFIG, sensor, sink);
    node.run().await
}
