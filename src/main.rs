#![no_std]
#![no_main]

use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::dma::DmaRxBuf;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::I2c;
use esp_hal::lcd_cam::LcdCam;
use esp_hal::lcd_cam::cam::{Camera, Config as CamConfig};
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;

extern crate alloc;

use esp_wifi::wifi;

use embassy_net::{Config, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use esp_hal_embassy::Executor;
use static_cell::StaticCell;

use cam_rs::camera::{self, CameraController};
use cam_rs::config;
use cam_rs::flash::FlashController;
use cam_rs::http_server::{self, SharedFlash};
use cam_rs::light_sensor::LightSensor;
use cam_rs::state_machine::{Action, SystemEvent, SystemStateMachine};
use cam_rs::wifi::{NetworkMode, WiFiManager};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

// Static cells for embassy components
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_CELL: StaticCell<Stack<'static>> = StaticCell::new();
static WIFI_MANAGER_CELL: StaticCell<WiFiManager<'static>> = StaticCell::new();
static FLASH_CELL: StaticCell<SharedFlash> = StaticCell::new();
static STATE_MACHINE_CELL: StaticCell<Mutex<CriticalSectionRawMutex, SystemStateMachine>> =
    StaticCell::new();

// Static executor for embassy tasks
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

// One JPEG frame buffer plus its DMA descriptors
const DESC_COUNT: usize = 32;
static mut FRAME_BUFFER: [u8; config::FRAME_BUFFER_SIZE] = [0u8; config::FRAME_BUFFER_SIZE];
#[unsafe(link_section = ".dram2_uninit")]
static mut DMA_DESCRIPTORS: [esp_hal::dma::DmaDescriptor; DESC_COUNT] =
    [esp_hal::dma::DmaDescriptor::EMPTY; DESC_COUNT];

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(
    mut runner: embassy_net::Runner<'static, esp_wifi::wifi::WifiDevice<'static>>,
) -> ! {
    runner.run().await
}

/// HTTP server task: owns the camera, serves one client at a time
#[embassy_executor::task]
async fn http_task(
    stack: Stack<'static>,
    camera: Option<CameraController>,
    flash: &'static SharedFlash,
) -> ! {
    stack.wait_config_up().await;
    http_server::serve(stack, camera, flash).await
}

/// Sensing task: samples the photoresistor and re-applies the flash policy
/// once per interval, independent of any active HTTP client
#[embassy_executor::task]
async fn sensing_task(mut sensor: LightSensor, flash: &'static SharedFlash) -> ! {
    let mut ticks: u32 = 0;

    loop {
        let level = sensor.sample();
        {
            let mut flash = flash.lock().await;
            flash.tick(level);

            // Periodic log, every fifth tick (~10s)
            if ticks % 5 == 0 {
                println!(
                    "[SENSE] Light: {} | Flash: {} | Mode: {}",
                    level,
                    if flash.is_on() { "ON" } else { "OFF" },
                    flash.mode().status_label()
                );
            }
        }
        ticks = ticks.wrapping_add(1);

        Timer::after(Duration::from_millis(config::LIGHT_CHECK_INTERVAL_MS)).await;
    }
}

/// State machine driven supervisor task
#[embassy_executor::task]
async fn supervisor_task(
    wifi_manager: &'static mut WiFiManager<'static>,
    state_machine: &'static Mutex<CriticalSectionRawMutex, SystemStateMachine>,
    camera_ok: bool,
) -> ! {
    println!("[STATE] Starting supervisor task");

    {
        let mut sm = state_machine.lock().await;
        sm.handle_event(SystemEvent::SystemStarted);
    }

    loop {
        let actions = {
            let mut sm = state_machine.lock().await;
            sm.update()
        };

        for action in actions {
            match action {
                Action::StartWiFiConnection => {
                    // Association already happened during boot; report the
                    // outcome to the state machine
                    match wifi_manager.mode() {
                        NetworkMode::Station if wifi_manager.is_connected() => {
                            state_machine
                                .lock()
                                .await
                                .handle_event(SystemEvent::WiFiConnected);
                        }
                        NetworkMode::Station => {
                            // Re-run association after a drop
                            match wifi_manager.connect(config::WIFI_SSID, config::WIFI_PASSWORD) {
                                Ok(_) => {
                                    state_machine
                                        .lock()
                                        .await
                                        .handle_event(SystemEvent::WiFiConnected);
                                }
                                Err(_) => {
                                    let mut sm = state_machine.lock().await;
                                    sm.increment_retry();
                                    sm.handle_event(SystemEvent::WiFiConnectionFailed);
                                }
                            }
                        }
                        NetworkMode::AccessPoint => {
                            state_machine
                                .lock()
                                .await
                                .handle_event(SystemEvent::StateTimeout);
                        }
                    }
                }
                Action::StartAccessPoint => {
                    if wifi_manager.mode() == NetworkMode::AccessPoint {
                        state_machine
                            .lock()
                            .await
                            .handle_event(SystemEvent::ApStarted);
                    } else {
                        match wifi_manager.start_access_point() {
                            Ok(_) => {
                                state_machine
                                    .lock()
                                    .await
                                    .handle_event(SystemEvent::ApStarted);
                            }
                            Err(_) => {
                                println!("[WIFI] Failed to start access point");
                                state_machine
                                    .lock()
                                    .await
                                    .handle_event(SystemEvent::WiFiConnectionFailed);
                            }
                        }
                    }
                }
                Action::StartDhcpRequest => {
                    if let Some(ip) = wifi_manager.get_ip_address() {
                        println!(
                            "[DHCP] IP address obtained: {}.{}.{}.{}",
                            ip[0], ip[1], ip[2], ip[3]
                        );
                        state_machine
                            .lock()
                            .await
                            .handle_event(SystemEvent::DhcpSuccess);
                    } else {
                        // No lease yet: wait, then count the attempt. The
                        // machine stays in DhcpRequesting until the retries
                        // run out and the error state takes over.
                        Timer::after(Duration::from_millis(1000)).await;
                        let mut sm = state_machine.lock().await;
                        sm.increment_retry();
                        sm.handle_event(SystemEvent::DhcpFailed);
                    }
                }
                Action::InitializeCamera => {
                    let event = if camera_ok {
                        println!("[CAM] Camera ready");
                        SystemEvent::CameraReady
                    } else {
                        println!("[CAM] Camera offline, capture endpoints will fail per call");
                        SystemEvent::CameraInitFailed
                    };
                    state_machine.lock().await.handle_event(event);
                }
                Action::StartHttpServer => {
                    // Spawned at boot; it starts accepting once the stack is up
                    println!("[STATE] HTTP server task active");
                    let mut sm = state_machine.lock().await;
                    sm.mark_http_started();
                    sm.handle_event(SystemEvent::HttpServerStarted);
                }
                Action::MonitorConnection => match wifi_manager.monitor_connection() {
                    Ok(_) => {
                        if !wifi_manager.is_connected() {
                            state_machine
                                .lock()
                                .await
                                .handle_event(SystemEvent::WiFiDisconnected);
                        }
                    }
                    Err(_) => {
                        state_machine
                            .lock()
                            .await
                            .handle_event(SystemEvent::WiFiDisconnected);
                    }
                },
                Action::SystemRecover => {
                    println!("[STATE] Initiating system recovery...");
                    state_machine
                        .lock()
                        .await
                        .handle_event(SystemEvent::RecoveryRequested);
                }
                Action::LogError(error_state) => {
                    println!("[STATE] Error logged: {:?}", error_state);
                }
            }
        }

        // Small delay to prevent busy loop
        Timer::after(Duration::from_millis(100)).await;
    }
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    println!("[MAIN] cam-rs {} booting", cam_rs::VERSION);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let mut rng = Rng::new(peripherals.RNG);
    let wifi_init = esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK).unwrap();

    println!("[WIFI] WiFi driver initialized successfully");

    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);
    let (wifi_controller, wifi_interfaces) = wifi::new(wifi_init_ref, peripherals.WIFI).unwrap();

    // Associate before building the network stack: the stack device and
    // address configuration depend on whether we end up in station or
    // fallback access-point mode
    let mut wifi_manager = WiFiManager::new(wifi_controller);
    let mode = match wifi_manager.connect(config::WIFI_SSID, config::WIFI_PASSWORD) {
        Ok(_) => NetworkMode::Station,
        Err(_) => {
            println!("[WIFI] Station association failed, starting access point");
            if wifi_manager.start_access_point().is_err() {
                println!("[WIFI] Access point startup failed, network unavailable");
            }
            NetworkMode::AccessPoint
        }
    };

    static STACK_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let stack_resources = STACK_RESOURCES.init(StackResources::new());
    let seed = ((rng.random() as u64) << 32) | rng.random() as u64;

    let (stack, runner) = match mode {
        NetworkMode::Station => {
            let net_config = Config::dhcpv4(Default::default());
            embassy_net::new(wifi_interfaces.sta, net_config, stack_resources, seed)
        }
        NetworkMode::AccessPoint => {
            let ap_ip = embassy_net::Ipv4Address::new(192, 168, 4, 1);
            let net_config = Config::ipv4_static(embassy_net::StaticConfigV4 {
                address: embassy_net::Ipv4Cidr::new(ap_ip, 24),
                gateway: Some(ap_ip),
                dns_servers: Default::default(),
            });
            embassy_net::new(wifi_interfaces.ap, net_config, stack_resources, seed)
        }
    };

    let stack_ref = STACK_CELL.init(stack);
    wifi_manager.set_stack(*stack_ref);

    println!("[WIFI] Embassy-net stack created");

    // Flash LED output, starts low
    let flash_pin = Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default());
    let flash = FLASH_CELL.init(Mutex::new(FlashController::new(flash_pin)));

    // Photoresistor on the ADC
    let mut adc_config = AdcConfig::new();
    let adc_pin = adc_config.enable_pin(peripherals.GPIO2, Attenuation::_11dB);
    let adc = Adc::new(peripherals.ADC1, adc_config);
    let sensor = LightSensor::new(adc, adc_pin);

    // Camera bring-up: SCCB, XCLK, sensor registers, then the LCD_CAM
    // capture path. Any failure leaves the camera offline; the HTTP
    // endpoints report per-request errors instead of halting boot.
    let delay = Delay::new();

    let mut i2c = I2c::new(peripherals.I2C0, esp_hal::i2c::master::Config::default())
        .unwrap()
        .with_sda(peripherals.GPIO40)
        .with_scl(peripherals.GPIO39);

    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let mut lstimer0 = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    lstimer0
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty1Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: esp_hal::time::Rate::from_mhz(24),
        })
        .unwrap();
    let mut channel0 = ledc.channel(channel::Number::Channel0, peripherals.GPIO10);
    channel0
        .configure(channel::config::Config {
            timer: &lstimer0,
            duty_pct: 50,
            pin_config: channel::config::PinConfig::PushPull,
        })
        .unwrap();

    println!("[CAM] LEDC configured: 24MHz XCLK on GPIO10");

    camera::ov2640_reset(&mut i2c);
    delay.delay_millis(10);
    camera::ov2640_init(&mut i2c);
    delay.delay_millis(10);
    camera::ov2640_jpeg_vga(&mut i2c, config::CAMERA_JPEG_QUALITY);
    delay.delay_millis(10);
    camera::ov2640_set_vflip(&mut i2c, true);
    delay.delay_millis(10);
    camera::ov2640_enable_output(&mut i2c);
    delay.delay_millis(300);

    let sensor_ok = match camera::ov2640_probe(&mut i2c) {
        Ok((pid, ver)) => {
            println!("[CAM] OV2640 ID: PID=0x{:02x} VER=0x{:02x}", pid, ver);
            true
        }
        Err(_) => {
            println!("[CAM] OV2640 did not respond on the SCCB bus");
            false
        }
    };

    let camera_controller = if sensor_ok {
        let lcd_cam = LcdCam::new(peripherals.LCD_CAM);
        match Camera::new(lcd_cam.cam, peripherals.DMA_CH0, CamConfig::default()) {
            Ok(cam) => {
                let cam = cam
                    .with_pixel_clock(peripherals.GPIO13)
                    .with_vsync(peripherals.GPIO38)
                    .with_h_enable(peripherals.GPIO47)
                    .with_data0(peripherals.GPIO15)
                    .with_data1(peripherals.GPIO17)
                    .with_data2(peripherals.GPIO18)
                    .with_data3(peripherals.GPIO16)
                    .with_data4(peripherals.GPIO14)
                    .with_data5(peripherals.GPIO12)
                    .with_data6(peripherals.GPIO11)
                    .with_data7(peripherals.GPIO48);

                let rx_buf = unsafe {
                    DmaRxBuf::new(
                        &mut *core::ptr::addr_of_mut!(DMA_DESCRIPTORS),
                        &mut *core::ptr::addr_of_mut!(FRAME_BUFFER),
                    )
                    .unwrap()
                };

                Some(CameraController::new(cam, rx_buf))
            }
            Err(e) => {
                println!("[CAM] LCD_CAM setup failed: {:?}", e);
                None
            }
        }
    } else {
        None
    };
    let camera_ok = camera_controller.is_some();

    // Static references for embassy tasks
    let wifi_manager = WIFI_MANAGER_CELL.init(wifi_manager);
    let state_machine = STATE_MACHINE_CELL.init(Mutex::new(SystemStateMachine::new()));

    // Initialize embassy executor and run tasks
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).ok();

        println!("[MAIN] Spawning supervisor task...");
        spawner
            .spawn(supervisor_task(wifi_manager, state_machine, camera_ok))
            .ok();

        println!("[MAIN] Spawning HTTP server task...");
        spawner
            .spawn(http_task(*stack_ref, camera_controller, flash))
            .ok();

        println!("[MAIN] Spawning sensing task...");
        spawner.spawn(sensing_task(sensor, flash)).ok();
    });
}
