//! End-to-end commit scenarios against the mock hardware.

mod common;

use std::sync::Arc;

use common::{request, Harness, HDMI_X6};
use dc_core::{ConnectorType, DcError, DceVersion};
use dc_hal::{
    BlendMode, ClockSourceId, EngineId, PlaneAddress, SurfacePixelFormat, TIMING_1920X1080_60,
    TIMING_3840X2160_60,
};

const T1080: dc_hal::CrtcTiming = TIMING_1920X1080_60;
const T2160: dc_hal::CrtcTiming = TIMING_3840X2160_60;

#[test]
fn test_single_stream_lights_up() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let s = h.stream(0, T1080);
    let fb = h.graphics(&T1080);

    let stats = h.dc.commit(&[request(&s, &[&fb])]).unwrap();
    assert_eq!(stats.back_ends_programmed, 1);
    assert_eq!(stats.full_updates, 1);

    let head = h.dc.current().res.head_for(&s).unwrap();
    assert_eq!(head.index, 0);
    assert!(matches!(head.clock_source, Some(ClockSourceId::Pll(_))));
    assert_eq!(head.stream_enc, Some(EngineId(0)));

    assert_eq!(h.count("tg", "program_timing"), 1);
    assert_eq!(h.count("clk", "program_pix_clk"), 1);
    assert_eq!(h.count("le", "enable_tmds_output"), 1);
    assert_eq!(h.count("se", "setup_hdmi"), 1);
    assert_eq!(h.count("mi", "program_surface_config"), 1);
    assert!(h.hw.tg_enabled(0));
    assert!(!h.hw.tg_blanked(0));
    assert_eq!(
        h.hw.scanout_address(0),
        Some(fb.address()),
        "head scans the committed surface"
    );
}

#[test]
fn test_identical_hdmi_streams_share_a_pll() {
    let mut h = Harness::new(DceVersion::Dce110, &HDMI_X6);
    let a = h.stream(0, T1080);
    let b = h.stream(1, T1080);
    let (fa, fb) = (h.graphics(&T1080), h.graphics(&T1080));

    h.commit(&[request(&a, &[&fa]), request(&b, &[&fb])]);
    let res = &h.dc.current().res;
    let pll = res.head_for(&a).unwrap().clock_source.unwrap();
    assert_eq!(res.head_for(&b).unwrap().clock_source, Some(pll));
    assert_eq!(res.clocks.ref_count(pll), 2);

    h.mark();
    h.commit(&[request(&a, &[&fa])]);
    assert_eq!(h.dc.current().res.clocks.ref_count(pll), 1);
    assert_eq!(h.count("clk", "power_down"), 0, "PLL still drives stream a");
    // The surviving stream is untouched
    assert_eq!(h.count("tg", "program_timing"), 0);
    assert!(!h.hw.tg_blanked(0));
}

#[test]
fn test_address_change_through_commit_is_a_flip() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let s = h.stream(0, T1080);
    let fb = h.graphics(&T1080);
    h.commit(&[request(&s, &[&fb])]);

    let next = Arc::new(fb.with_address(PlaneAddress::Graphics { addr: 0xdead_0000 }, false));
    h.mark();
    let stats = h.dc.commit(&[request(&s, &[&next])]).unwrap();

    assert_eq!(stats.fast_updates, 1);
    assert_eq!(stats.back_ends_programmed, 0);
    let calls = h.calls();
    assert_eq!(calls.len(), 1, "unexpected writes: {calls:?}");
    assert_eq!(calls[0].block, "mi");
    assert_eq!(calls[0].op, "program_surface_flip_and_addr");
    assert_eq!(calls[0].arg, 0xdead_0000);
}

#[test]
fn test_fourth_4k_stream_exceeds_bandwidth() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let streams: Vec<_> = (0..4).map(|i| h.stream(i, T2160)).collect();
    let fbs: Vec<_> = (0..4).map(|_| h.graphics(&T2160)).collect();
    let requests: Vec<_> = streams
        .iter()
        .zip(&fbs)
        .map(|(s, fb)| request(s, &[fb]))
        .collect();

    h.commit(&requests[..3]);
    let assignment = |h: &Harness| -> Vec<_> {
        h.dc.current()
            .res
            .active()
            .map(|p| (p.index, p.tg, p.clock_source, p.stream_enc))
            .collect()
    };
    let before = assignment(&h);

    h.mark();
    assert_eq!(
        h.dc.validate_resources(&requests),
        Err(DcError::BandwidthExceeded)
    );
    assert_eq!(h.dc.validate_resources(&requests[..3]), Ok(()));
    assert!(h.calls().is_empty(), "validation touched hardware");
    assert_eq!(h.dc.telemetry().rejected, 0);

    assert_eq!(h.dc.commit(&requests), Err(DcError::BandwidthExceeded));
    assert!(h.calls().is_empty(), "rejected commit touched hardware");
    assert_eq!(h.dc.current().streams.len(), 3);
    assert_eq!(assignment(&h), before);
    assert_eq!(h.dc.telemetry().rejected, 1);
}

fn underlay_blending(version: DceVersion) {
    let mut h = Harness::new(version, &HDMI_X6);
    let s = h.stream(0, T1080);
    let gfx = h.graphics(&T1080);
    let video = h.surface(SurfacePixelFormat::Nv12, &T1080);

    h.commit(&[request(&s, &[&gfx])]);
    assert_eq!(h.hw.blend_mode(0), Some(BlendMode::CurrentPipeOnly));

    h.mark();
    let stats = h.dc.commit(&[request(&s, &[&gfx, &video])]).unwrap();
    assert_eq!(stats.back_ends_programmed, 0);
    assert_eq!(stats.medium_updates, 1, "head only re-blends");
    assert_eq!(stats.full_updates, 1, "new bottom pipe is fully programmed");
    assert_eq!(h.hw.blend_mode(0), Some(BlendMode::Blending));
    assert!(!h.hw.tg_locked(0));
    assert_eq!(h.count("tg", "lock"), 1);

    let head = h.dc.current().res.head_for(&s).unwrap();
    let bottom = head.bottom_pipe.unwrap();
    assert_eq!(h.dc.current().res.pipes[bottom].top_pipe, Some(head.index));

    h.mark();
    h.commit(&[request(&s, &[&gfx])]);
    assert_eq!(h.hw.blend_mode(0), Some(BlendMode::CurrentPipeOnly));
    assert_eq!(h.hw.log().count_inst("mi", bottom, "set_blank"), 2);
    assert!(h.dc.current().res.pipes[bottom].stream.is_none());
}

#[test]
fn test_underlay_blending_dce110() {
    underlay_blending(DceVersion::Dce110);
}

#[test]
fn test_mpc_blending_dcn10() {
    underlay_blending(DceVersion::Dcn10);
}

#[test]
fn test_video_needs_an_underlay_on_dce() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let s = h.stream(0, T1080);
    let gfx = h.graphics(&T1080);
    let video = h.surface(SurfacePixelFormat::Nv12, &T1080);
    assert_eq!(
        h.dc.commit(&[request(&s, &[&gfx, &video])]),
        Err(DcError::TooManySurfaces)
    );
}

#[test]
fn test_dp_stream_trains_link_before_unblank() {
    let mut h = Harness::new(
        DceVersion::Dce112,
        &[ConnectorType::DisplayPort, ConnectorType::Hdmi],
    );
    let s = h.stream(0, T1080);
    let fb = h.graphics(&T1080);
    h.commit(&[request(&s, &[&fb])]);

    let head = h.dc.current().res.head_for(&s).unwrap();
    assert_eq!(head.clock_source, Some(ClockSourceId::DpDto));
    assert!(head.link_settings.is_some());

    let train = h.position("le", "perform_link_training").unwrap();
    let mn = h.position("se", "dp_set_mn").unwrap();
    let unblank = h.position("se", "dp_unblank").unwrap();
    assert!(h.position("le", "enable_dp_output").unwrap() < train);
    assert!(train < mn && mn < unblank);
    assert!(h.hw.dig_enabled(0));
}

#[test]
fn test_removing_last_stream_releases_everything() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let s = h.stream(0, T1080);
    let fb = h.graphics(&T1080);
    h.commit(&[request(&s, &[&fb])]);
    let pll = h.dc.current().res.head_for(&s).unwrap().clock_source.unwrap();

    h.mark();
    let stats = h.dc.commit(&[]).unwrap();
    assert_eq!(stats.pipes_reset, 1);
    assert!(h.dc.current().res.active().next().is_none());
    assert_eq!(h.dc.current().res.clocks.outstanding(), 0);
    assert_eq!(h.count("clk", "power_down"), 1);
    assert!(
        h.calls()
            .iter()
            .any(|c| c.block == "fw" && c.inst == 0 && c.op == "enable_crtc" && c.arg == 0)
    );
    assert!(!h.hw.tg_enabled(0));
    assert!(!h.hw.dig_enabled(0));
    assert_eq!(h.dc.current().res.clocks.ref_count(pll), 0);
}

#[test]
fn test_timing_change_reprograms_only_that_head() {
    let mut h = Harness::new(DceVersion::Dce112, &HDMI_X6);
    let a = h.stream(0, T1080);
    let b = h.stream(1, T1080);
    let (fa, fb) = (h.graphics(&T1080), h.graphics(&T1080));
    h.commit(&[request(&a, &[&fa]), request(&b, &[&fb])]);

    let b720 = h.stream(1, dc_hal::TIMING_1280X720_60);
    let fb720 = h.graphics(&dc_hal::TIMING_1280X720_60);
    h.mark();
    let stats = h
        .dc
        .commit(&[request(&a, &[&fa]), request(&b720, &[&fb720])])
        .unwrap();

    assert_eq!(stats.pipes_reset, 1);
    assert_eq!(stats.back_ends_programmed, 1);
    let programmed: Vec<_> = h
        .calls()
        .iter()
        .filter(|c| c.block == "tg" && c.op == "program_timing")
        .map(|c| c.inst)
        .collect();
    assert_eq!(programmed, vec![1]);
    assert_eq!(h.hw.tg_timing(1), Some(dc_hal::TIMING_1280X720_60));
}
