//! Scenario files and the runner that plays them against [`MockHw`].
//!
//! A scenario names an ASIC, the connectors on its board, the streams and
//! surfaces it will use, and an ordered list of steps. Each step either
//! succeeds or fails with exactly the error its `expect` field names.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use dc_core::{
    CommitStats, ConnectorType, Dc, DcConfig, DcError, DcInitData, DceVersion, LinkDesc, Sink,
    Stream, StreamRequest, Surface, SurfaceDesc, SurfaceFlip,
};
use dc_hal::mock::{MockConfig, MockHw};
use dc_hal::{
    AudioOutput, CrtcTiming, CursorAttributes, CursorColorFormat, CursorPosition, DrrParams,
    GamutRemap, PlaneAddress, SurfacePixelFormat,
};
use serde::Deserialize;

/// Operations the mock can be told to fail.
const FAULTABLE_OPS: &[&str] = &[
    "program_timing",
    "enable_crtc",
    "set_blank",
    "lock",
    "set_drr",
    "program_surface_flip_and_addr",
    "program_surface_flip_immediate",
    "program_surface_config",
    "set_scaler",
    "set_gamut_remap",
    "set_cursor_attributes",
    "set_cursor_position",
    "perform_link_training",
    "enable_dp_output",
    "enable_tmds_output",
    "program_pix_clk",
    "set_clock",
    "update_blending",
    "power_on",
];

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub asic: String,
    pub links: Vec<Connector>,
    #[serde(default)]
    pub config: ConfigOverrides,
    #[serde(default)]
    pub streams: BTreeMap<String, StreamEntry>,
    #[serde(default)]
    pub surfaces: BTreeMap<String, SurfaceEntry>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Connector {
    Hdmi,
    Dp,
    Edp,
    DviD,
    Dvi,
    Virtual,
}

impl From<Connector> for ConnectorType {
    fn from(c: Connector) -> Self {
        match c {
            Connector::Hdmi => Self::Hdmi,
            Connector::Dp => Self::DisplayPort,
            Connector::Edp => Self::Edp,
            Connector::DviD => Self::DviD,
            Connector::Dvi => Self::DviSingle,
            Connector::Virtual => Self::Virtual,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigOverrides {
    pub enable_timing_sync: Option<bool>,
    pub disable_clock_sharing: Option<bool>,
    pub apply_safe_watermarks: Option<bool>,
    pub gsl_max_frames: Option<u32>,
}

impl ConfigOverrides {
    fn apply(&self, mut config: DcConfig) -> DcConfig {
        if let Some(v) = self.enable_timing_sync {
            config.enable_timing_sync = v;
        }
        if let Some(v) = self.disable_clock_sharing {
            config.disable_clock_sharing = v;
        }
        if let Some(v) = self.apply_safe_watermarks {
            config.apply_safe_watermarks = v;
        }
        if let Some(v) = self.gsl_max_frames {
            config.gsl_max_frames = v;
        }
        // Scenarios inject faults on purpose
        config.assert_on_invariant_violation = false;
        config
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamEntry {
    pub link: usize,
    /// `WxH@R`, e.g. `1920x1080@60`.
    pub mode: String,
    #[serde(default)]
    pub audio: bool,
}

#[derive(Debug, Deserialize)]
pub struct SurfaceEntry {
    #[serde(default = "default_format")]
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub address: Option<u64>,
}

fn default_format() -> Format {
    Format::Argb8888
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Rgb565,
    Argb8888,
    Argb2101010,
    Fp16,
    Nv12,
    P010,
}

impl From<Format> for SurfacePixelFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Rgb565 => Self::Rgb565,
            Format::Argb8888 => Self::Argb8888,
            Format::Argb2101010 => Self::Argb2101010,
            Format::Fp16 => Self::Fp16,
            Format::Nv12 => Self::Nv12,
            Format::P010 => Self::P010,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// `Debug` rendering of the error this step must fail with.
    pub expect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Head {
    pub stream: String,
    #[serde(default)]
    pub surfaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum Action {
    /// Replace the whole configuration.
    Commit { heads: Vec<Head> },
    /// Check a configuration without committing it.
    Validate { heads: Vec<Head> },
    Flip {
        surface: String,
        address: u64,
        #[serde(default)]
        immediate: bool,
    },
    Dpms { stream: String, on: bool },
    Cursor {
        stream: String,
        size: u32,
        x: u32,
        y: u32,
    },
    Drr {
        stream: String,
        /// Lines added to the nominal vertical total; `None` disables DRR.
        stretch: Option<u32>,
    },
    Gamut { stream: String, enabled: bool },
    /// Make the next write of `op` fail.
    FailOnce { op: String },
    /// Let simulated time pass.
    Wait { us: u64 },
    PowerDown,
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Self::Commit { .. } => "commit",
            Self::Validate { .. } => "validate",
            Self::Flip { .. } => "flip",
            Self::Dpms { .. } => "dpms",
            Self::Cursor { .. } => "cursor",
            Self::Drr { .. } => "drr",
            Self::Gamut { .. } => "gamut",
            Self::FailOnce { .. } => "fail_once",
            Self::Wait { .. } => "wait",
            Self::PowerDown => "power_down",
        }
    }
}

pub fn load(path: &Path) -> Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
}

/// Parse `WxH@R` into one of the built-in timings.
pub fn parse_mode(mode: &str) -> Result<CrtcTiming> {
    let parsed = mode.split_once('@').and_then(|(size, refresh)| {
        let (w, h) = size.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?, refresh.parse().ok()?))
    });
    let (w, h, r) = parsed.ok_or_else(|| anyhow!("mode {mode:?} is not WxH@R"))?;
    dc_hal::standard_timing(w, h, r).ok_or_else(|| anyhow!("no built-in timing for {mode}"))
}

/// Outcome of one step that did not fail.
enum Done {
    Committed(CommitStats),
    Note(String),
}

pub struct Runner {
    hw: MockHw,
    dc: Dc,
    streams: BTreeMap<String, Arc<Stream>>,
    surfaces: BTreeMap<String, Arc<Surface>>,
}

impl Runner {
    pub fn new(scenario: &Scenario, version: DceVersion) -> Result<Self> {
        let hw = MockHw::new(MockConfig {
            links: scenario.links.len().max(MockConfig::default().links),
            ..MockConfig::default()
        });
        let mut init = DcInitData::new(
            version,
            Arc::new(hw.clone()),
            scenario
                .links
                .iter()
                .map(|c| LinkDesc::new((*c).into()))
                .collect(),
        );
        init.config = scenario.config.apply(init.config);
        let mut dc = Dc::create(init).context("creating display core")?;

        let mut streams = BTreeMap::new();
        for (name, entry) in &scenario.streams {
            let connector = scenario
                .links
                .get(entry.link)
                .copied()
                .ok_or_else(|| anyhow!("stream {name}: no link {}", entry.link))?;
            let mut sink = Sink::new(entry.link, connector.into());
            if entry.audio {
                sink = sink.with_audio(AudioOutput {
                    channel_count: 2,
                    sample_rate_hz: 48_000,
                });
            }
            let timing = parse_mode(&entry.mode).with_context(|| format!("stream {name}"))?;
            streams.insert(name.clone(), dc.create_stream_for_sink(Arc::new(sink), timing));
        }

        let mut surfaces = BTreeMap::new();
        let mut next_addr = 0x1_0000_0000_u64;
        for (name, entry) in &scenario.surfaces {
            let addr = entry.address.unwrap_or(next_addr);
            next_addr += 0x1000_0000;
            let desc = SurfaceDesc::fullscreen(entry.format.into(), entry.width, entry.height, addr);
            surfaces.insert(name.clone(), dc.create_surface(desc));
        }

        Ok(Self {
            hw,
            dc,
            streams,
            surfaces,
        })
    }

    pub fn hw(&self) -> &MockHw {
        &self.hw
    }

    pub fn dc(&self) -> &Dc {
        &self.dc
    }

    /// Play every step, stopping at the first one whose outcome differs
    /// from what the scenario expects.
    pub fn run(&mut self, steps: &[Step]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            let mark = self.hw.log().len();
            let outcome = self
                .apply(&step.action)
                .with_context(|| format!("step {i} ({})", step.action.label()))?;
            let writes = self.hw.log().len() - mark;
            match (outcome, &step.expect) {
                (Ok(done), None) => println!(
                    "[{i:>2}] {:<10} ok   {} ({writes} writes)",
                    step.action.label(),
                    describe(&done)
                ),
                (Err(e), Some(want)) if format!("{e:?}") == *want => println!(
                    "[{i:>2}] {:<10} rejected as expected: {e} ({writes} writes)",
                    step.action.label()
                ),
                (Ok(_), Some(want)) => {
                    bail!("step {i} ({}) succeeded, expected {want}", step.action.label())
                }
                (Err(e), _) => {
                    bail!("step {i} ({}) failed: {e} [{e:?}]", step.action.label())
                }
            }
        }
        Ok(())
    }

    /// Lookup errors in the scenario itself surface as the outer `Err`;
    /// display core failures are the inner one.
    fn apply(&mut self, action: &Action) -> Result<Result<Done, DcError>> {
        Ok(match action {
            Action::Commit { heads } => {
                let requests = self.requests(heads)?;
                self.dc.commit(&requests).map(Done::Committed)
            }
            Action::Validate { heads } => {
                let requests = self.requests(heads)?;
                self.dc
                    .validate_resources(&requests)
                    .map(|()| Done::Note("valid".into()))
            }
            Action::Flip {
                surface,
                address,
                immediate,
            } => {
                let old = self.surface(surface)?.clone();
                let flip = SurfaceFlip {
                    surface: old,
                    address: PlaneAddress::Graphics { addr: *address },
                    flip_immediate: *immediate,
                };
                match self.dc.flip_surface_addrs(&[flip]) {
                    Ok(mut flipped) => {
                        if let Some(new) = flipped.pop() {
                            self.surfaces.insert(surface.clone(), new);
                        }
                        Ok(Done::Note(format!("scanning {address:#x}")))
                    }
                    Err(e) => Err(e),
                }
            }
            Action::Dpms { stream, on } => {
                let stream = self.stream(stream)?.clone();
                self.dc
                    .set_dpms(&stream, *on)
                    .map(|()| Done::Note(if *on { "on" } else { "off" }.into()))
            }
            Action::Cursor { stream, size, x, y } => {
                let stream = self.stream(stream)?.clone();
                let attributes = CursorAttributes {
                    address: 0x8000,
                    width: *size,
                    height: *size,
                    color_format: CursorColorFormat::PreMultipliedAlpha,
                };
                let position = CursorPosition {
                    x: *x,
                    y: *y,
                    enable: true,
                    ..CursorPosition::default()
                };
                self.dc
                    .set_cursor_attributes(&stream, &attributes)
                    .and_then(|()| self.dc.set_cursor_position(&stream, &position))
                    .map(|()| Done::Note(format!("{size}px at {x},{y}")))
            }
            Action::Drr { stream, stretch } => {
                let stream = self.stream(stream)?.clone();
                let v_total = stream.timing().v_total;
                let params = stretch.map(|extra| DrrParams {
                    vertical_total_min: v_total,
                    vertical_total_max: v_total + extra,
                });
                self.dc
                    .set_drr(&stream, params)
                    .map(|()| Done::Note(format!("{params:?}")))
            }
            Action::Gamut { stream, enabled } => {
                let stream = self.stream(stream)?.clone();
                let remap = GamutRemap {
                    enabled: *enabled,
                    ..GamutRemap::IDENTITY
                };
                self.dc
                    .set_gamut_remap(&stream, remap)
                    .map(|()| Done::Note(format!("enabled={enabled}")))
            }
            Action::FailOnce { op } => {
                let op = FAULTABLE_OPS
                    .iter()
                    .find(|known| **known == op.as_str())
                    .ok_or_else(|| anyhow!("cannot inject a fault into {op:?}"))?;
                self.hw.fail_once(op);
                Ok(Done::Note(format!("next {op} fails")))
            }
            Action::Wait { us } => {
                self.hw.clock().advance(*us);
                Ok(Done::Note(format!("{us}us")))
            }
            Action::PowerDown => self
                .dc
                .power_down()
                .map(|()| Done::Note("all heads off".into())),
        })
    }

    fn requests(&self, heads: &[Head]) -> Result<Vec<StreamRequest>> {
        heads
            .iter()
            .map(|head| {
                let surfaces = head
                    .surfaces
                    .iter()
                    .map(|name| self.surface(name).cloned())
                    .collect::<Result<Vec<_>>>()?;
                Ok(StreamRequest::new(self.stream(&head.stream)?.clone(), surfaces))
            })
            .collect()
    }

    fn stream(&self, name: &str) -> Result<&Arc<Stream>> {
        self.streams
            .get(name)
            .ok_or_else(|| anyhow!("unknown stream {name:?}"))
    }

    fn surface(&self, name: &str) -> Result<&Arc<Surface>> {
        self.surfaces
            .get(name)
            .ok_or_else(|| anyhow!("unknown surface {name:?}"))
    }
}

fn describe(done: &Done) -> String {
    match done {
        Done::Committed(stats) if *stats == CommitStats::default() => "unchanged".into(),
        Done::Committed(stats) => format!(
            "reset={} back_ends={} fast={} medium={} full={} dispclk={}kHz",
            stats.pipes_reset,
            stats.back_ends_programmed,
            stats.fast_updates,
            stats.medium_updates,
            stats.full_updates,
            stats.dispclk_khz
        ),
        Done::Note(note) => note.clone(),
    }
}
