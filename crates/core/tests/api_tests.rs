//! Direct operations on committed streams and surfaces.

mod common;

use std::sync::Arc;

use common::{request, Harness, HDMI_X6};
use dc_core::{ConnectorType, DcError, DcState, DceVersion, ResourceKind, SurfaceFlip};
use dc_hal::{
    AudioOutput, CursorAttributes, CursorColorFormat, CursorPosition, DrrParams, GamutRemap,
    HwError, PlaneAddress, TIMING_1920X1080_60,
};

const T1080: dc_hal::CrtcTiming = TIMING_1920X1080_60;

fn lit(version: DceVersion) -> (Harness, Arc<dc_core::Stream>, Arc<dc_core::Surface>) {
    let mut h = Harness::new(version, &HDMI_X6);
    let s = h.stream(0, T1080);
    let fb = h.graphics(&T1080);
    h.commit(&[request(&s, &[&fb])]);
    h.mark();
    (h, s, fb)
}

fn cursor(size: u32) -> CursorAttributes {
    CursorAttributes {
        address: 0x8000,
        width: size,
        height: size,
        color_format: CursorColorFormat::PreMultipliedAlpha,
    }
}

#[test]
fn test_flip_writes_only_the_address() {
    let (mut h, s, fb) = lit(DceVersion::Dce112);
    let flipped = h
        .dc
        .flip_surface_addrs(&[SurfaceFlip {
            surface: fb.clone(),
            address: PlaneAddress::Graphics { addr: 0xbeef_0000 },
            flip_immediate: true,
        }])
        .unwrap();

    let calls = h.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "program_surface_flip_immediate");
    assert_eq!(flipped[0].id(), fb.id());
    assert_eq!(flipped[0].address(), PlaneAddress::Graphics { addr: 0xbeef_0000 });

    // The new handle replaced the old one everywhere
    let status = h.dc.current().status_for(&s).unwrap();
    assert!(Arc::ptr_eq(&status.surfaces[0], &flipped[0]));
    assert_eq!(h.dc.telemetry().flips, 1);

    // Committing the flipped handle again is a no-op
    h.mark();
    h.commit(&[request(&s, &[&flipped[0]])]);
    assert!(h.calls().is_empty());
}

#[test]
fn test_flip_of_unknown_surface_writes_nothing() {
    let (mut h, _s, fb) = lit(DceVersion::Dce112);
    let stranger = h.graphics(&T1080);
    let flips = [
        SurfaceFlip {
            surface: fb,
            address: PlaneAddress::Graphics { addr: 1 },
            flip_immediate: false,
        },
        SurfaceFlip {
            surface: stranger,
            address: PlaneAddress::Graphics { addr: 2 },
            flip_immediate: false,
        },
    ];
    assert_eq!(
        h.dc.flip_surface_addrs(&flips),
        Err(DcError::SurfaceNotFound)
    );
    assert!(h.calls().is_empty());
}

#[test]
fn test_surfaces_replaced_on_one_stream() {
    let mut h = Harness::new(DceVersion::Dcn10, &HDMI_X6);
    let a = h.stream(0, T1080);
    let b = h.stream(1, T1080);
    let (fa, fb, extra) = (h.graphics(&T1080), h.graphics(&T1080), h.graphics(&T1080));
    h.commit(&[request(&a, &[&fa]), request(&b, &[&fb])]);

    h.mark();
    let stats = h
        .dc
        .commit_surfaces_to_stream(&b, vec![fb.clone(), extra.clone()])
        .unwrap();
    assert_eq!(stats.back_ends_programmed, 0);
    assert_eq!(h.dc.current().status_for(&b).unwrap().surfaces.len(), 2);
    assert_eq!(h.dc.current().status_for(&a).unwrap().surfaces.len(), 1);
    // Stream a keeps scanning untouched
    assert!(
        h.calls()
            .iter()
            .all(|c| c.inst != 0 || !matches!(c.block, "tg" | "xfm" | "ipp" | "opp"))
    );

    let orphan = h.dc.create_stream_for_sink(
        Arc::new(dc_core::Sink::new(2, ConnectorType::Hdmi)),
        T1080,
    );
    assert_eq!(
        h.dc.commit_surfaces_to_stream(&orphan, vec![]),
        Err(DcError::StreamNotFound)
    );
}

#[test]
fn test_cursor_size_limit() {
    let (mut h, s, _fb) = lit(DceVersion::Dce110);
    assert_eq!(
        h.dc.set_cursor_attributes(&s, &cursor(256)),
        Err(DcError::CursorTooLarge)
    );
    assert!(h.calls().is_empty());

    h.dc.set_cursor_attributes(&s, &cursor(64)).unwrap();
    h.dc
        .set_cursor_position(
            &s,
            &CursorPosition {
                x: 10,
                y: 20,
                enable: true,
                ..CursorPosition::default()
            },
        )
        .unwrap();
    assert_eq!(h.hw.log().count_inst("ipp", 0, "set_cursor_attributes"), 1);
    assert_eq!(h.hw.log().count_inst("ipp", 0, "set_cursor_position"), 1);

    // DCN takes larger cursors
    let (mut h, s, _fb) = lit(DceVersion::Dcn10);
    h.dc.set_cursor_attributes(&s, &cursor(256)).unwrap();
}

#[test]
fn test_dpms_blanks_without_releasing() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let sink = dc_core::Sink::new(0, ConnectorType::Hdmi).with_audio(AudioOutput {
        channel_count: 2,
        sample_rate_hz: 48_000,
    });
    let s = h.dc.create_stream_for_sink(Arc::new(sink), T1080);
    let fb = h.graphics(&T1080);
    h.commit(&[request(&s, &[&fb])]);
    assert!(h.dc.current().res.head_for(&s).unwrap().audio.is_some());

    h.mark();
    h.dc.set_dpms(&s, false).unwrap();
    assert!(h.hw.tg_blanked(0));
    assert_eq!(h.count("se", "set_avmute"), 1);
    assert!(h.dc.current().res.head_for(&s).unwrap().clock_source.is_some());

    // A flip does not wake the display
    let next = Arc::new(fb.with_address(PlaneAddress::Graphics { addr: 0x42 }, false));
    h.commit(&[request(&s, &[&next])]);
    assert!(h.hw.tg_blanked(0));

    h.dc.set_dpms(&s, true).unwrap();
    assert!(!h.hw.tg_blanked(0));
    assert_eq!(h.count("se", "set_avmute"), 2);
}

#[test]
fn test_drr_and_counters() {
    let (mut h, s, _fb) = lit(DceVersion::Dce112);
    let params = DrrParams {
        vertical_total_min: T1080.v_total,
        vertical_total_max: T1080.v_total * 2,
    };
    h.dc.set_drr(&s, Some(params)).unwrap();
    assert_eq!(h.hw.drr(0), Some(params));
    h.dc.set_drr(&s, None).unwrap();
    assert_eq!(h.hw.drr(0), None);

    let before = h.dc.get_vblank_counter(&s).unwrap();
    h.hw.clock().advance(u64::from(T1080.frame_time_us()) * 3);
    assert_eq!(h.dc.get_vblank_counter(&s).unwrap(), before + 3);
    assert!(h.dc.get_scanout_position(&s).unwrap().vertical_count < T1080.v_total);
}

#[test]
fn test_gamut_remap_sticks_across_full_updates() {
    let mut h = Harness::new(DceVersion::Dcn10, &HDMI_X6);
    let s = h.stream(0, T1080);
    let (top, bottom) = (h.graphics(&T1080), h.graphics(&T1080));
    h.commit(&[request(&s, &[&top, &bottom])]);

    let remap = GamutRemap {
        enabled: true,
        ..GamutRemap::IDENTITY
    };
    h.mark();
    h.dc.set_gamut_remap(&s, remap).unwrap();
    assert_eq!(h.count("xfm", "set_gamut_remap"), 2);
    assert!(h.calls().iter().all(|c| c.arg == 1));

    // A new surface is fully programmed with the stored remap
    let other = h.graphics(&T1080);
    h.mark();
    h.commit(&[request(&s, &[&top, &other])]);
    let writes: Vec<_> = h
        .calls()
        .into_iter()
        .filter(|c| c.op == "set_gamut_remap")
        .collect();
    assert!(!writes.is_empty());
    assert!(writes.iter().all(|c| c.arg == 1));
}

#[test]
fn test_display_settings_are_dropped_with_their_stream() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let (a, b) = (h.stream(0, T1080), h.stream(1, T1080));
    let (fa, fb) = (h.graphics(&T1080), h.graphics(&T1080));
    h.commit(&[request(&a, &[&fa]), request(&b, &[&fb])]);

    let remap = GamutRemap {
        enabled: true,
        ..GamutRemap::IDENTITY
    };
    h.dc.set_gamut_remap(&a, remap).unwrap();
    h.dc.set_gamut_remap(&b, remap).unwrap();
    h.dc.set_dpms(&a, false).unwrap();
    h.dc.set_dpms(&b, false).unwrap();

    h.commit(&[request(&b, &[&fb])]);
    let state = h.dc.hw_state();
    assert!(!state.gamut.contains_key(&a.id()));
    assert!(!state.dpms_off.contains(&a.id()));
    assert_eq!(state.gamut.get(&b.id()), Some(&remap));
    assert!(state.dpms_off.contains(&b.id()));

    h.dc.power_down().unwrap();
    assert!(h.dc.hw_state().gamut.is_empty());
    assert!(h.dc.hw_state().dpms_off.is_empty());
}

#[test]
fn test_validation_never_touches_hardware() {
    let mut h = Harness::new(DceVersion::Dce110, &HDMI_X6);
    let streams: Vec<_> = (0..4).map(|i| h.stream(i, T1080)).collect();
    let requests: Vec<_> = streams.iter().map(|s| request(s, &[])).collect();

    assert_eq!(h.dc.validate_resources(&requests[..3]), Ok(()));
    assert_eq!(
        h.dc.validate_resources(&requests),
        Err(DcError::InsufficientResources(ResourceKind::Pipe))
    );
    assert_eq!(
        h.dc.validate_resources(&[requests[0].clone(), requests[0].clone()]),
        Err(DcError::DuplicateStream)
    );
    assert!(h.calls().is_empty());
    assert!(h.dc.current().streams.is_empty());
}

#[test]
fn test_bad_requests_are_rejected() {
    let mut h = Harness::new(DceVersion::Dce112, &[ConnectorType::DviSingle]);
    let too_fast = h.stream(0, dc_hal::TIMING_2560X1440_60);
    assert_eq!(
        h.dc.commit(&[request(&too_fast, &[])]),
        Err(DcError::EncoderValidationFailed)
    );

    let nowhere = h.dc.create_stream_for_sink(
        Arc::new(dc_core::Sink::new(5, ConnectorType::Hdmi)),
        T1080,
    );
    assert_eq!(
        h.dc.commit(&[request(&nowhere, &[])]),
        Err(DcError::LinkNotFound)
    );
    assert_eq!(h.dc.telemetry().rejected, 2);
    assert_eq!(h.dc.state(), DcState::Ready);
}

#[test]
fn test_virtual_link_needs_no_encoder() {
    let mut h = Harness::new(DceVersion::Dce112, &[ConnectorType::Virtual]);
    let s = h.stream(0, T1080);
    let fb = h.graphics(&T1080);
    h.commit(&[request(&s, &[&fb])]);

    let head = h.dc.current().res.head_for(&s).unwrap();
    assert_eq!(head.stream_enc, None);
    assert_eq!(head.clock_source, Some(dc_hal::ClockSourceId::DpDto));
    assert!(h.calls().iter().all(|c| c.block != "le" && c.block != "se"));
}

#[test]
fn test_direct_write_failure_marks_hardware_uncertain() {
    let (mut h, s, _fb) = lit(DceVersion::Dce112);
    h.hw.fail_once("set_cursor_position");
    assert_eq!(
        h.dc.set_cursor_position(&s, &CursorPosition::default()),
        Err(DcError::HwAck(HwError::NotAcknowledged))
    );
    assert_eq!(h.dc.state(), DcState::HardwareUncertain);

    // Next commit of the same configuration is not skipped
    let requests = h.dc.current().requests();
    h.mark();
    let stats = h.dc.commit(&requests).unwrap();
    assert_eq!(stats.back_ends_programmed, 1);
    assert_eq!(h.dc.state(), DcState::Ready);
}

#[test]
fn test_power_down_returns_to_boot_state() {
    let (mut h, _s, _fb) = lit(DceVersion::Dce110);
    h.dc.power_down().unwrap();
    assert!(h.dc.current().streams.is_empty());
    assert!(!h.hw.tg_enabled(0));
    assert_eq!(h.dc.hw_state().dispclk_khz, h.hw.config().dispclk_boot_khz);
    assert!(h.dc.hw_state().controllers_on.is_empty());
}
