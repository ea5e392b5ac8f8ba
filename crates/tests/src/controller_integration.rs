//! Integration tests for the audio controller
//!
//! These tests drive the controller against the simulated hardware session,
//! covering configuration, activation and every kind of session event, both
//! directly and through the control loop.

use cadenza_core::domain::audio::{Category, CategoryOptions, HardwareSession, ProcessingUnit};
use cadenza_core::domain::channels::{ChannelRequest, ChannelSpec};
use cadenza_core::domain::command::{Command, CommandExecutor};
use cadenza_core::domain::controller::{
    AudioController, ControllerSettings, ControllerState, ModeRequest,
};
use cadenza_core::domain::events::{ResumePolicy, RouteChangeReason};
use cadenza_core::domain::policy::{Feature, FeatureFlags, OperatingMode};
use cadenza_core::domain::status::ConfigurationStatus;
use cadenza_infra::audio::{Operation, SessionCall, SimulatedSession, SimulatedUnit};
use cadenza_infra::control::ControlLoop;
use proptest::prelude::*;
use std::sync::Arc;

type Controller = AudioController<Arc<SimulatedSession>, Arc<SimulatedUnit>>;

fn create_controller(
    session: SimulatedSession,
    settings: ControllerSettings,
) -> (Controller, Arc<SimulatedSession>, Arc<SimulatedUnit>) {
    let session = Arc::new(session);
    let unit = Arc::new(SimulatedUnit::new());
    let controller = AudioController::new(
        Arc::clone(&session),
        Arc::clone(&unit),
        &session.event_bus(),
        settings,
    );
    (controller, session, unit)
}

fn request(sample_rate: f64, channels: ChannelRequest) -> ModeRequest {
    ModeRequest::new(sample_rate, channels)
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_record_with_zero_input_makes_no_hardware_calls() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());

    let status = controller.configure_record(request(44100.0, ChannelRequest::fixed(0, 2)));

    assert_eq!(status, ConfigurationStatus::Error);
    assert!(session.calls().is_empty());
    assert!(unit.configurations().is_empty());
    assert_eq!(controller.state(), ControllerState::Unconfigured);
}

#[test]
fn test_playback_with_input_and_zero_output_is_error() {
    let (mut controller, session, _unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());

    let status = controller.configure_playback(
        request(44100.0, ChannelRequest::fixed(2, 0)).with_input_enabled(true),
    );

    assert_eq!(status, ConfigurationStatus::Error);
    assert!(session.calls().is_empty());
}

#[test]
fn test_full_configuration_sequence() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());

    let status = controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));
    assert_eq!(status, ConfigurationStatus::Ok);

    let calls = session.calls();
    assert_eq!(calls[0], SessionCall::SetPreferredSampleRate(48000.0));
    assert_eq!(calls[1], SessionCall::SetCategory(Category::PlayAndRecord));
    assert_eq!(
        calls[2],
        SessionCall::SetCategoryWithOptions(
            Category::PlayAndRecord,
            CategoryOptions::MIX_WITH_OTHERS | CategoryOptions::DEFAULT_TO_SPEAKER
        )
    );
    assert_eq!(calls[3], SessionCall::SetActive(true));
    assert_eq!(calls.len(), 4);

    let pushed = unit.last_configuration().unwrap();
    assert_eq!(pushed.sample_rate, 48000.0);
    assert_eq!(pushed.input_channels, 2);
    assert_eq!(pushed.output_channels, 2);
    assert!(!unit.is_active());
}

#[test]
fn test_unsupported_sample_rate_is_property_changed() {
    let (mut controller, _session, unit) = create_controller(
        SimulatedSession::new().with_supported_rates(vec![48000.0]),
        ControllerSettings::default(),
    );

    let status = controller.configure_playback(request(44100.0, ChannelRequest::auto()));

    assert_eq!(status, ConfigurationStatus::PropertyChanged);
    assert_eq!(controller.sample_rate(), 48000.0);
    assert_eq!(unit.last_configuration().unwrap().sample_rate, 48000.0);
}

#[test]
fn test_downgraded_category_is_property_changed() {
    let (mut controller, session, _unit) = create_controller(
        SimulatedSession::new()
            .with_category_substitution(Category::MultiRoute, Category::Playback),
        ControllerSettings::default(),
    );

    let status = controller.configure_multi_route(request(48000.0, ChannelRequest::auto()));

    assert_eq!(status, ConfigurationStatus::PropertyChanged);
    assert_eq!(session.category(), Some(Category::Playback));
}

#[test]
fn test_masked_options_are_property_changed() {
    let (mut controller, _session, _unit) = create_controller(
        SimulatedSession::new().with_grantable_options(CategoryOptions::empty()),
        ControllerSettings::default(),
    );

    let status = controller.configure_playback(request(48000.0, ChannelRequest::auto()));

    assert_eq!(status, ConfigurationStatus::PropertyChanged);
}

#[test]
fn test_rejected_activation_aborts_before_push() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    session.reject(Operation::SetActive);

    let status = controller.configure_playback(request(48000.0, ChannelRequest::auto()));

    assert!(status.is_error());
    assert!(unit.configurations().is_empty());
    assert_eq!(controller.state(), ControllerState::Unconfigured);
}

#[test]
fn test_mono_hardware_without_prefer_stereo() {
    let settings = ControllerSettings {
        flags: FeatureFlags {
            prefer_stereo: false,
            ..FeatureFlags::default()
        },
        ..ControllerSettings::default()
    };
    let (mut controller, _session, unit) = create_controller(
        SimulatedSession::new().with_route(1, 1, true),
        settings,
    );

    controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));

    let pushed = unit.last_configuration().unwrap();
    assert_eq!(pushed.input_channels, 1);
    assert_eq!(pushed.output_channels, 1);
}

#[test]
fn test_ticks_per_buffer_on_simulated_hardware() {
    let (mut controller, _session, _unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_playback(request(44100.0, ChannelRequest::auto()));

    for ticks in [1, 2, 4, 8, 16] {
        assert_eq!(controller.configure_ticks_per_buffer(ticks), ConfigurationStatus::Ok);
        assert_eq!(controller.ticks_per_buffer(), ticks);
    }
}

#[test]
fn test_ticks_beyond_frame_range_are_clamped() {
    let (mut controller, _session, _unit) = create_controller(
        SimulatedSession::new().with_frame_range(64, 512),
        ControllerSettings::default(),
    );
    controller.configure_playback(request(48000.0, ChannelRequest::auto()));

    let status = controller.configure_ticks_per_buffer(64);

    assert_eq!(status, ConfigurationStatus::PropertyChanged);
    assert_eq!(controller.ticks_per_buffer(), 8);
}

// ============================================================================
// ACTIVATION AND FEATURE FLAGS
// ============================================================================

#[test]
fn test_deferred_options_applied_exactly_once() {
    let (mut controller, session, _unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));
    session.clear_calls();

    controller.set_feature(Feature::AllowBluetoothA2dp, true);
    controller.set_feature(Feature::DuckOthers, true);
    assert!(session.calls().is_empty());
    assert!(controller.options_pending());

    assert_eq!(controller.set_active(true), ConfigurationStatus::Ok);

    let option_calls: Vec<_> = session
        .calls()
        .into_iter()
        .filter(|call| matches!(call, SessionCall::SetCategoryWithOptions(..)))
        .collect();
    assert_eq!(option_calls.len(), 1);
    let options = session.category_options();
    assert!(options.contains(CategoryOptions::ALLOW_BLUETOOTH_A2DP));
    assert!(options.contains(CategoryOptions::DUCK_OTHERS));
    assert!(options.contains(CategoryOptions::MIX_WITH_OTHERS));
}

#[test]
fn test_rejected_deferred_options_keep_unit_inactive() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_playback(request(48000.0, ChannelRequest::auto()));
    controller.set_feature(Feature::DuckOthers, true);
    session.reject(Operation::SetCategoryWithOptions);

    assert!(controller.set_active(true).is_error());
    assert!(!unit.is_active());
    assert!(controller.options_pending());

    session.accept(Operation::SetCategoryWithOptions);
    assert!(controller.set_active(true).is_ok());
    assert!(unit.is_active());
}

// ============================================================================
// SESSION EVENTS
// ============================================================================

#[test]
fn test_interruption_round_trip_does_not_renegotiate() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_playback(request(48000.0, ChannelRequest::auto()));
    controller.set_active(true);
    let pushes = unit.configurations().len();
    session.clear_calls();

    session.interrupt();
    controller.process_pending_events();
    assert!(!unit.is_active());
    assert!(controller.is_active_requested());
    assert_eq!(controller.state(), ControllerState::Interrupted(OperatingMode::Playback));

    session.end_interruption(true);
    controller.process_pending_events();
    assert!(unit.is_active());
    assert_eq!(controller.state(), ControllerState::Active(OperatingMode::Playback));
    assert!(session.calls().is_empty());
    assert_eq!(unit.configurations().len(), pushes);
}

#[test]
fn test_respect_hint_policy() {
    let settings = ControllerSettings {
        resume_policy: ResumePolicy::RespectHint,
        ..ControllerSettings::default()
    };
    let (mut controller, session, unit) = create_controller(SimulatedSession::new(), settings);
    controller.configure_playback(request(48000.0, ChannelRequest::auto()));
    controller.set_active(true);

    session.interrupt();
    session.end_interruption(false);
    assert_eq!(controller.process_pending_events(), 2);

    assert!(!unit.is_active());
    assert_eq!(controller.state(), ControllerState::Interrupted(OperatingMode::Playback));
}

#[test]
fn test_route_change_reconfigures_inactive_unit() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));

    session.change_route(4, 6, true, RouteChangeReason::Override);
    controller.process_pending_events();

    let pushed = unit.last_configuration().unwrap();
    assert_eq!(pushed.input_channels, 4);
    assert_eq!(pushed.output_channels, 6);
    assert!(!unit.is_active());
}

#[test]
fn test_route_change_with_fixed_channels_is_noop() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_play_and_record(request(48000.0, ChannelRequest::fixed(2, 2)));
    controller.set_active(true);
    let pushes = unit.configurations().len();

    session.change_route(4, 6, true, RouteChangeReason::NewDeviceAvailable);
    controller.process_pending_events();

    assert_eq!(unit.configurations().len(), pushes);
    assert!(unit.is_active());
}

#[test]
fn test_route_change_in_playback_keeps_input_off() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_playback(request(
        48000.0,
        ChannelRequest::new(ChannelSpec::Auto, ChannelSpec::Auto),
    ));

    session.change_route(2, 4, true, RouteChangeReason::NewDeviceAvailable);
    controller.process_pending_events();

    let pushed = unit.last_configuration().unwrap();
    assert_eq!(pushed.input_channels, 0);
    assert_eq!(pushed.output_channels, 4);
}

#[test]
fn test_media_services_reset_before_configuration() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());

    session.reset_media_services();
    controller.process_pending_events();

    assert!(session.calls().is_empty());
    assert!(unit.configurations().is_empty());
    assert_eq!(controller.state(), ControllerState::Unconfigured);
}

#[test]
fn test_media_services_reset_restores_everything() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));
    controller.set_active(true);
    let options = session.category_options();
    let pushes = unit.configurations().len();

    session.reset_media_services();
    assert_eq!(session.category(), None);
    controller.process_pending_events();

    assert_eq!(session.category(), Some(Category::PlayAndRecord));
    assert_eq!(session.category_options(), options);
    assert!(session.is_active());
    assert_eq!(unit.configurations().len(), pushes + 1);
    assert!(unit.is_active());
    assert_eq!(unit.pushes_while_active(), 0);
}

#[test]
fn test_unit_is_never_configured_while_active() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));
    controller.set_active(true);

    session.change_route(1, 2, true, RouteChangeReason::OldDeviceUnavailable);
    session.change_route(6, 8, true, RouteChangeReason::NewDeviceAvailable);
    session.reset_media_services();
    controller.process_pending_events();
    controller.configure_playback(request(44100.0, ChannelRequest::fixed(0, 2)));
    controller.set_feature(Feature::DuckOthers, true);

    assert_eq!(unit.pushes_while_active(), 0);
    assert!(unit.is_active());
}

#[test]
fn test_drop_unsubscribes_and_deactivates() {
    let (mut controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    controller.configure_playback(request(48000.0, ChannelRequest::auto()));
    controller.set_active(true);

    drop(controller);

    assert!(!unit.is_active());
    assert!(!session.event_bus().has_subscriber());
    assert!(!session.interrupt());
}

// ============================================================================
// EVENT SEQUENCES
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Activate(bool),
    Interrupt,
    EndInterruption(bool),
    Route(u32, u32, bool),
    Reset,
    Flag(Feature, bool),
}

fn arb_step() -> impl Strategy<Value = Step> {
    let feature = prop_oneof![
        Just(Feature::MixWithOthers),
        Just(Feature::DuckOthers),
        Just(Feature::AllowBluetooth),
        Just(Feature::DefaultToSpeaker),
    ];
    prop_oneof![
        any::<bool>().prop_map(Step::Activate),
        Just(Step::Interrupt),
        any::<bool>().prop_map(Step::EndInterruption),
        (0u32..6, 1u32..8, any::<bool>()).prop_map(|(i, o, a)| Step::Route(i, o, a)),
        Just(Step::Reset),
        (feature, any::<bool>()).prop_map(|(f, on)| Step::Flag(f, on)),
    ]
}

proptest! {
    #[test]
    fn prop_event_sequences_keep_unit_consistent(
        respect_hint in any::<bool>(),
        steps in proptest::collection::vec(arb_step(), 1..40),
    ) {
        let settings = ControllerSettings {
            resume_policy: if respect_hint {
                ResumePolicy::RespectHint
            } else {
                ResumePolicy::Always
            },
            ..ControllerSettings::default()
        };
        let (mut controller, session, unit) = create_controller(SimulatedSession::new(), settings);
        let status = controller.configure_play_and_record(request(48000.0, ChannelRequest::auto()));
        prop_assert!(!status.is_error());

        for step in steps {
            match step {
                Step::Activate(active) => {
                    controller.set_active(active);
                }
                Step::Interrupt => {
                    session.interrupt();
                }
                Step::EndInterruption(hint) => {
                    session.end_interruption(hint);
                }
                Step::Route(input, output, available) => {
                    session.change_route(input, output, available, RouteChangeReason::Override);
                }
                Step::Reset => {
                    session.reset_media_services();
                }
                Step::Flag(feature, enabled) => {
                    controller.set_feature(feature, enabled);
                }
            }
            controller.process_pending_events();

            prop_assert_eq!(unit.pushes_while_active(), 0);
            match controller.state() {
                ControllerState::Interrupted(_) => prop_assert!(!unit.is_active()),
                ControllerState::Active(_) => prop_assert!(controller.is_active_requested()),
                ControllerState::Configured(_) => prop_assert!(!unit.is_active()),
                ControllerState::Unconfigured => prop_assert!(false, "controller lost its mode"),
            }
        }
    }
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

#[tokio::test]
async fn test_control_loop_scenario() {
    let (controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    let handle = ControlLoop::spawn(controller).unwrap();

    let status = handle
        .execute(Command::Configure {
            mode: OperatingMode::PlayAndRecord,
            request: request(48000.0, ChannelRequest::auto()),
        })
        .await
        .unwrap()
        .status();
    assert_eq!(status, ConfigurationStatus::Ok);
    handle
        .execute(Command::SetActive { active: true })
        .await
        .unwrap();

    session.change_route(4, 2, true, RouteChangeReason::NewDeviceAvailable);
    let report = handle
        .execute(Command::Report)
        .await
        .unwrap()
        .into_report()
        .unwrap();

    assert_eq!(report.state, ControllerState::Active(OperatingMode::PlayAndRecord));
    assert_eq!(report.effective_channels.input, 4);
    assert_eq!(unit.last_configuration().unwrap().input_channels, 4);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["state"]["state"], "active");
    assert_eq!(json["requested_channels"]["input"], "auto");

    handle.shutdown();
    assert!(!unit.is_active());
}

#[test]
fn test_control_loop_serializes_concurrent_callers() {
    let (controller, session, unit) =
        create_controller(SimulatedSession::new(), ControllerSettings::default());
    let handle = Arc::new(ControlLoop::spawn(controller).unwrap());
    handle
        .execute_blocking(Command::Configure {
            mode: OperatingMode::Playback,
            request: request(48000.0, ChannelRequest::auto()),
        })
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || {
                for round in 0..10 {
                    let output = 2 + (i + round) % 4;
                    handle
                        .execute_blocking(Command::Configure {
                            mode: OperatingMode::Playback,
                            request: request(48000.0, ChannelRequest::fixed(0, output)),
                        })
                        .unwrap();
                    handle
                        .execute_blocking(Command::SetActive { active: round % 2 == 0 })
                        .unwrap();
                }
            })
        })
        .collect();
    for _ in 0..10 {
        session.change_route(2, 2, true, RouteChangeReason::Override);
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(unit.pushes_while_active(), 0);
}
