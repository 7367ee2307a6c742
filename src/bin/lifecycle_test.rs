//! Lifecycle state machine test program
//!
//! Walks the boot, fallback and recovery paths through the system state
//! machine and checks the generated actions.

#![no_std]
#![no_main]

extern crate alloc;

use cam_rs::state_machine::{Action, SystemEvent, SystemState, SystemStateMachine};
use esp_hal::clock::CpuClock;
use esp_println::println;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let _peripherals = esp_hal::init(hal_config);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 32 * 1024);

    println!("=== Lifecycle state machine test ===");

    println!("\n1. Happy-path boot");
    let mut sm = SystemStateMachine::new();
    assert_eq!(sm.get_current_state(), SystemState::SystemInit);

    sm.handle_event(SystemEvent::SystemStarted);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);

    sm.handle_event(SystemEvent::WiFiConnected);
    assert_eq!(sm.get_current_state(), SystemState::DhcpRequesting);

    sm.handle_event(SystemEvent::DhcpSuccess);
    assert_eq!(sm.get_current_state(), SystemState::CameraInit);

    sm.handle_event(SystemEvent::CameraReady);
    assert_eq!(sm.get_current_state(), SystemState::Serving);
    assert!(sm.is_operational());
    println!("✅ Boot reaches the serving state");

    println!("\n2. Serving actions");
    let actions = sm.update();
    assert!(actions.contains(&Action::StartHttpServer));
    assert!(actions.contains(&Action::MonitorConnection));
    sm.mark_http_started();
    sm.handle_event(SystemEvent::HttpServerStarted);
    assert_eq!(sm.get_current_state(), SystemState::Serving);
    let actions = sm.update();
    assert!(!actions.contains(&Action::StartHttpServer));
    assert!(actions.contains(&Action::MonitorConnection));
    println!("✅ HTTP server is started once, monitoring continues");

    println!("\n3. Access-point fallback");
    let mut sm = SystemStateMachine::new();
    sm.handle_event(SystemEvent::SystemStarted);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);

    // First two failures keep retrying, the third exhausts the retries
    sm.increment_retry();
    sm.handle_event(SystemEvent::WiFiConnectionFailed);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);
    sm.increment_retry();
    sm.handle_event(SystemEvent::WiFiConnectionFailed);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);
    sm.increment_retry();
    assert!(!sm.should_retry());
    sm.handle_event(SystemEvent::WiFiConnectionFailed);
    assert_eq!(sm.get_current_state(), SystemState::ApFallback);

    let actions = sm.update();
    assert!(actions.contains(&Action::StartAccessPoint));

    sm.handle_event(SystemEvent::ApStarted);
    assert_eq!(sm.get_current_state(), SystemState::CameraInit);
    assert_eq!(sm.get_retry_count(), 0);
    println!("✅ Exhausted retries fall back to the AP, then camera init");

    println!("\n4. Camera failure still serves");
    sm.handle_event(SystemEvent::CameraInitFailed);
    assert_eq!(sm.get_current_state(), SystemState::Serving);
    println!("✅ A dead camera does not stop the HTTP server");

    println!("\n5. Disconnect and recovery");
    sm.handle_event(SystemEvent::WiFiDisconnected);
    assert_eq!(sm.get_current_state(), SystemState::Reconnecting);

    let actions = sm.update();
    assert!(actions.contains(&Action::SystemRecover));

    sm.handle_event(SystemEvent::WiFiConnected);
    assert_eq!(sm.get_current_state(), SystemState::DhcpRequesting);
    println!("✅ Reconnection re-runs DHCP");

    println!("\n6. Error recovery path");
    let mut sm = SystemStateMachine::new();
    sm.handle_event(SystemEvent::SystemStarted);
    sm.increment_retry();
    sm.force_transition(SystemState::WiFiError);
    assert!(sm.is_error_state());
    assert_eq!(sm.get_previous_state(), Some(SystemState::WiFiConnecting));
    assert_eq!(sm.get_retry_count(), 0);

    sm.set_error_context(SystemState::WiFiError);
    let ctx = sm.get_error_context().unwrap();
    assert_eq!(ctx.error_state, SystemState::WiFiError);
    assert_eq!(ctx.last_good_state, SystemState::WiFiConnecting);

    let actions = sm.update();
    assert!(actions.contains(&Action::LogError(SystemState::WiFiError)));
    assert!(actions.contains(&Action::SystemRecover));

    sm.handle_event(SystemEvent::RecoveryRequested);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);
    sm.clear_error_context();
    assert!(sm.get_error_context().is_none());
    println!("✅ WiFi error recovers into a fresh connection attempt");

    println!("\n7. Retry bookkeeping");
    sm.increment_retry();
    sm.increment_retry();
    assert_eq!(sm.get_retry_count(), 2);
    assert!(sm.should_retry());
    sm.reset_retry_count();
    assert_eq!(sm.get_retry_count(), 0);
    println!("✅ Retry counter resets cleanly");

    println!("\n8. Irrelevant events keep the state");
    let mut sm = SystemStateMachine::new();
    sm.handle_event(SystemEvent::DhcpSuccess);
    assert_eq!(sm.get_current_state(), SystemState::SystemInit);
    sm.handle_event(SystemEvent::CameraReady);
    assert_eq!(sm.get_current_state(), SystemState::SystemInit);
    println!("✅ Unexpected events are ignored");

    println!("\n9. DHCP exhaustion enters the error state");
    let mut sm = SystemStateMachine::new();
    sm.handle_event(SystemEvent::SystemStarted);
    sm.handle_event(SystemEvent::WiFiConnected);
    assert_eq!(sm.get_current_state(), SystemState::DhcpRequesting);

    sm.increment_retry();
    sm.handle_event(SystemEvent::DhcpFailed);
    assert_eq!(sm.get_current_state(), SystemState::DhcpRequesting);
    sm.increment_retry();
    sm.handle_event(SystemEvent::DhcpFailed);
    assert_eq!(sm.get_current_state(), SystemState::DhcpRequesting);
    sm.increment_retry();
    sm.handle_event(SystemEvent::DhcpFailed);
    assert_eq!(sm.get_current_state(), SystemState::WiFiError);

    // Fresh retry budget on entry, so recovery actually runs
    assert_eq!(sm.get_retry_count(), 0);
    let actions = sm.update();
    assert!(actions.contains(&Action::SystemRecover));
    sm.handle_event(SystemEvent::RecoveryRequested);
    assert_eq!(sm.get_current_state(), SystemState::WiFiConnecting);
    println!("✅ A dead DHCP server leads to recovery, not a parked machine");

    println!("\n=== All tests passed! ===");

    loop {
        for _ in 0..1000000 {
            unsafe {
                core::ptr::read_volatile(&0u32);
            }
        }
    }
}
