use anyhow::{Result, anyhow};
use dc_core::DceVersion;
use dc_hal::{
    TIMING_640X480_60, TIMING_1280X720_60, TIMING_1920X1080_60, TIMING_2560X1440_60,
    TIMING_3840X2160_60,
};

use crate::scenario::{self, Runner};

pub fn run(cli: crate::cli::Cli) -> Result<()> {
    match cli.cmd {
        crate::cli::Cmd::Run {
            scenario,
            asic,
            histogram,
        } => run_scenario(&scenario, asic, histogram),
        crate::cli::Cmd::ListModes => {
            list_modes();
            Ok(())
        }
    }
}

fn run_scenario(
    path: &std::path::Path,
    asic: Option<crate::cli::Asic>,
    histogram: bool,
) -> Result<()> {
    let scenario = scenario::load(path)?;
    let version = match asic {
        Some(asic) => asic.version(),
        None => DceVersion::from_name(&scenario.asic)
            .ok_or_else(|| anyhow!("unknown asic {:?}", scenario.asic))?,
    };

    let title = if scenario.name.is_empty() {
        path.display().to_string()
    } else {
        scenario.name.clone()
    };
    println!("== {title} on {}", version.name());

    let mut runner = Runner::new(&scenario, version)?;
    println!(
        "   {} pipes, sequencer {}",
        runner.dc().pool().pipe_count(),
        runner.dc().sequencer_name()
    );
    runner.run(&scenario.steps)?;

    let t = runner.dc().telemetry();
    println!(
        "== commits={} skipped={} rejected={} hw_failures={} flips={} gsl_timeouts={} state={:?}",
        t.commits,
        t.skipped,
        t.rejected,
        t.hw_failures,
        t.flips,
        t.gsl_timeouts,
        runner.dc().state()
    );

    if histogram {
        for (block, op, count) in runner.hw().log().histogram() {
            println!("   {block:>4}.{op:<32} {count}");
        }
    }
    Ok(())
}

fn list_modes() {
    for t in [
        TIMING_640X480_60,
        TIMING_1280X720_60,
        TIMING_1920X1080_60,
        TIMING_2560X1440_60,
        TIMING_3840X2160_60,
    ] {
        println!(
            "{}x{}@{}  {} kHz",
            t.h_addressable,
            t.v_addressable,
            t.refresh_hz(),
            t.pix_clk_khz
        );
    }
}
