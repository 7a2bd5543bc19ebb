use labctl_core::*;

// Two-card rig: amplifier command on Dev2, readback on Dev1, PFI lines wired between them.
fn two_card_config() -> RigConfig {
    RigConfig::from_json_str(
        r#"{
            "channels": {
                "patch-command": "Dev2/ao0",
                "patch-voltage": "Dev1/ai22",
                "patch-current": "Dev1/ai20",
                "clock-1": "/Dev1/PFI1",
                "clock-2": "/Dev2/PFI7"
            }
        }"#,
    )
    .unwrap()
}

fn seal_wave(config: &RigConfig) -> Waveform {
    let c = &config.constants;
    Waveform::block(c.samp_rate, c.freq, c.v_min, c.v_max, c.duty).unwrap()
}

#[test]
fn seal_plan_on_single_card() {
    let config = RigConfig::default();
    let plan = SessionPlan::configure(
        seal_wave(&config),
        config.constants.samp_rate,
        SessionMode::Continuous { chunk_size: 100 },
        &config.roles,
        &config.channels,
    )
    .unwrap();

    assert_eq!(plan.output().channel.name(), "Dev1/ao0");
    assert_eq!(
        plan.inputs()
            .iter()
            .map(|input| input.channel.name())
            .collect::<Vec<_>>(),
        vec!["Dev1/ai22", "Dev1/ai20"]
    );
    assert_eq!(plan.clock().write_clock_src(), "/Dev1/ai/SampleClock");
    assert_eq!(plan.clock().export_terminal(), None);
    assert_eq!(plan.waveform().len(), 100);
}

#[test]
fn seal_plan_across_cards_exports_clock() {
    let config = two_card_config();
    let plan = SessionPlan::configure(
        seal_wave(&config),
        config.constants.samp_rate,
        SessionMode::Continuous { chunk_size: 100 },
        &config.roles,
        &config.channels,
    )
    .unwrap();

    assert!(matches!(plan.clock(), ClockAssignment::ReadIsClock1 { .. }));
    assert_eq!(plan.clock().export_terminal(), Some("/Dev1/PFI1"));
    assert_eq!(plan.clock().write_clock_src(), "/Dev2/PFI7");
}

#[test]
fn unroutable_clock_fails_before_any_hardware() {
    let mut config = two_card_config();
    config.channels.insert(CLOCK_1, "/Dev3/PFI1");
    config.channels.insert(CLOCK_2, "/Dev4/PFI7");
    let result = SessionPlan::configure(
        seal_wave(&config),
        config.constants.samp_rate,
        SessionMode::Continuous { chunk_size: 100 },
        &config.roles,
        &config.channels,
    );
    assert!(matches!(result, Err(SessionError::ClockResolution { .. })));
}

#[test]
fn zap_plan_is_finite() {
    let config = RigConfig::default();
    let zap = Waveform::pulse(0.5, 100, 10).unwrap();
    let plan = SessionPlan::configure(
        zap,
        100_000.,
        SessionMode::Pulse,
        &config.roles,
        &config.channels,
    )
    .unwrap();
    assert_eq!(plan.output_timing().mode, SampleMode::Finite);
    assert_eq!(plan.output_timing().samps_per_chan, 110);
    assert!(plan.pulse_timeout() > plan.waveform().duration(100_000.));
}
