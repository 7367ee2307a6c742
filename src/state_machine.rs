//! System state machine module
//!
//! Manages the firmware lifecycle: WiFi association (with soft-AP fallback),
//! DHCP, camera bring-up and the serving state.

use esp_println::println;

/// System states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    // Initialization
    SystemInit,

    // Network bring-up
    WiFiConnecting,
    DhcpRequesting,
    ApFallback,

    // Peripheral bring-up
    CameraInit,

    // Running
    Serving,

    // Error states
    WiFiError,

    // Recovery
    Reconnecting,
}

/// System events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    // System events
    SystemStarted,

    // Network events
    WiFiConnected,
    WiFiConnectionFailed,
    WiFiDisconnected,
    ApStarted,
    DhcpSuccess,
    DhcpFailed,

    // Camera events
    CameraReady,
    CameraInitFailed,

    // Service events
    HttpServerStarted,

    // Recovery events
    RecoveryRequested,
    StateTimeout,
}

/// Result of a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current state
    Stay,
    /// Move to a new state
    Transition(SystemState),
    /// Move to a new state and reset the retry counter
    TransitionWithReset(SystemState),
}

/// Actions the state machine asks the supervisor to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start WiFi station association
    StartWiFiConnection,
    /// Bring up the fallback access point
    StartAccessPoint,
    /// Wait for a DHCP lease
    StartDhcpRequest,
    /// Initialize the camera sensor and capture path
    InitializeCamera,
    /// Start the HTTP server
    StartHttpServer,
    /// Monitor the network link
    MonitorConnection,
    /// Recover from an error state
    SystemRecover,
    /// Record an error
    LogError(SystemState),
}

/// Error context information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    pub error_state: SystemState,
    pub error_count: u32,
    pub last_good_state: SystemState,
}

/// System state machine
pub struct SystemStateMachine {
    current_state: SystemState,
    previous_state: Option<SystemState>,
    retry_count: u32,
    error_context: Option<ErrorContext>,
    max_retries: u32,
    http_started: bool, // HTTP server is spawned once, on first entry to Serving
}

impl SystemStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SystemState::SystemInit,
            previous_state: None,
            retry_count: 0,
            error_context: None,
            max_retries: 3,
            http_started: false,
        }
    }

    pub fn get_current_state(&self) -> SystemState {
        self.current_state
    }

    pub fn get_previous_state(&self) -> Option<SystemState> {
        self.previous_state
    }

    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Handle a system event
    pub fn handle_event(&mut self, event: SystemEvent) -> StateTransition {
        let transition = self.get_state_transition(self.current_state, event);

        match transition {
            StateTransition::Transition(new_state) => {
                self.transition_to_state(new_state);
            }
            StateTransition::TransitionWithReset(new_state) => {
                self.retry_count = 0;
                self.transition_to_state(new_state);
            }
            StateTransition::Stay => {}
        }

        transition
    }

    /// Produce the actions for the current state
    pub fn update(&mut self) -> alloc::vec::Vec<Action> {
        let mut actions = alloc::vec::Vec::new();

        match self.current_state {
            SystemState::SystemInit => {}

            SystemState::WiFiConnecting => {
                actions.push(Action::StartWiFiConnection);
            }

            SystemState::ApFallback => {
                actions.push(Action::StartAccessPoint);
            }

            SystemState::DhcpRequesting => {
                actions.push(Action::StartDhcpRequest);
            }

            SystemState::CameraInit => {
                actions.push(Action::InitializeCamera);
            }

            SystemState::Serving => {
                // Spawn the HTTP server only once when first entering this state
                if !self.http_started {
                    actions.push(Action::StartHttpServer);
                }
                actions.push(Action::MonitorConnection);
            }

            SystemState::WiFiError => {
                actions.push(Action::LogError(self.current_state));
                if self.retry_count < self.max_retries {
                    actions.push(Action::SystemRecover);
                }
            }

            SystemState::Reconnecting => {
                actions.push(Action::SystemRecover);
            }
        }

        actions
    }

    fn transition_to_state(&mut self, new_state: SystemState) {
        if new_state != self.current_state {
            // Only print critical state changes
            match new_state {
                SystemState::Serving => println!("[STATE] System serving"),
                SystemState::ApFallback => println!("[STATE] Falling back to access point"),
                SystemState::WiFiError => {
                    println!("[STATE] Error state: {:?}", new_state);
                }
                _ => {} // Silent for normal transitions
            }

            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }
    }

    /// State transition rules
    fn get_state_transition(
        &self,
        current_state: SystemState,
        event: SystemEvent,
    ) -> StateTransition {
        match (current_state, event) {
            // Boot sequence
            (SystemState::SystemInit, SystemEvent::SystemStarted) => {
                StateTransition::Transition(SystemState::WiFiConnecting)
            }

            // Station association; exhausted retries fall back to the AP
            (SystemState::WiFiConnecting, SystemEvent::WiFiConnected) => {
                StateTransition::TransitionWithReset(SystemState::DhcpRequesting)
            }
            (SystemState::WiFiConnecting, SystemEvent::WiFiConnectionFailed) => {
                if self.retry_count < self.max_retries {
                    StateTransition::Stay
                } else {
                    StateTransition::Transition(SystemState::ApFallback)
                }
            }
            (SystemState::WiFiConnecting, SystemEvent::StateTimeout) => {
                StateTransition::Transition(SystemState::ApFallback)
            }

            // AP fallback skips DHCP, the address is fixed
            (SystemState::ApFallback, SystemEvent::ApStarted) => {
                StateTransition::TransitionWithReset(SystemState::CameraInit)
            }

            // DHCP
            (SystemState::DhcpRequesting, SystemEvent::DhcpSuccess) => {
                StateTransition::TransitionWithReset(SystemState::CameraInit)
            }
            // Exhausted DHCP attempts enter the error state with a fresh
            // retry budget so recovery can run
            (SystemState::DhcpRequesting, SystemEvent::DhcpFailed) => {
                if self.retry_count < self.max_retries {
                    StateTransition::Stay
                } else {
                    StateTransition::TransitionWithReset(SystemState::WiFiError)
                }
            }
            (SystemState::DhcpRequesting, SystemEvent::StateTimeout) => {
                StateTransition::Transition(SystemState::WiFiError)
            }

            // Camera bring-up. A failed sensor does not stop the server;
            // capture endpoints answer per-request errors instead.
            (SystemState::CameraInit, SystemEvent::CameraReady) => {
                StateTransition::TransitionWithReset(SystemState::Serving)
            }
            (SystemState::CameraInit, SystemEvent::CameraInitFailed) => {
                StateTransition::Transition(SystemState::Serving)
            }

            // Serving
            (SystemState::Serving, SystemEvent::HttpServerStarted) => StateTransition::Stay,

            // WiFi drop from any state
            (_, SystemEvent::WiFiDisconnected) => {
                StateTransition::Transition(SystemState::Reconnecting)
            }

            // Reconnection re-runs DHCP, the lease may have changed
            (SystemState::Reconnecting, SystemEvent::WiFiConnected) => {
                StateTransition::Transition(SystemState::DhcpRequesting)
            }
            (SystemState::Reconnecting, SystemEvent::RecoveryRequested) => {
                StateTransition::Transition(SystemState::WiFiConnecting)
            }

            // Error recovery
            (SystemState::WiFiError, SystemEvent::RecoveryRequested) => {
                StateTransition::Transition(SystemState::WiFiConnecting)
            }

            // Default: keep the current state
            _ => StateTransition::Stay,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn reset_retry_count(&mut self) {
        self.retry_count = 0;
    }

    pub fn set_error_context(&mut self, error_state: SystemState) {
        let last_good_state = self.previous_state.unwrap_or(SystemState::SystemInit);
        self.error_context = Some(ErrorContext {
            error_state,
            error_count: self.retry_count,
            last_good_state,
        });
    }

    pub fn get_error_context(&self) -> Option<ErrorContext> {
        self.error_context
    }

    pub fn clear_error_context(&mut self) {
        self.error_context = None;
    }

    pub fn is_error_state(&self) -> bool {
        matches!(self.current_state, SystemState::WiFiError)
    }

    pub fn is_operational(&self) -> bool {
        matches!(self.current_state, SystemState::Serving)
    }

    /// Force a transition (used for emergency recovery)
    pub fn force_transition(&mut self, new_state: SystemState) {
        self.transition_to_state(new_state);
        self.retry_count = 0;
        self.error_context = None;
    }

    /// Record that the HTTP server task has been spawned
    pub fn mark_http_started(&mut self) {
        self.http_started = true;
    }
}
