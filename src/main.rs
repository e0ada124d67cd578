use flexi_logger::{FileSpec, Logger, LoggerHandle, WriteMode};
use log::{error, info, warn};
use opaccuracy::error::Result;
use opaccuracy::param::{self, Param};
use opaccuracy::{cinfo, run};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::env;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn init_logger(param: &Param) -> std::result::Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(&param.general.log_level)?;
    if param.general.log_base.is_empty() {
        logger.start()
    } else {
        logger
            .log_to_file(FileSpec::default().basename(&param.general.log_base).suffix(&param.general.log_suffix))
            .write_mode(WriteMode::BufferAndFlush)
            .duplicate_to_stderr(flexi_logger::Duplicate::Warn)
            .start()
    }
}

/// Clears `running` on SIGINT or SIGTERM so the experiment stops between trials
fn watch_signals(running: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        for signal in signals.forever() {
            warn!("Signal {} received, stopping after the running trials...", signal);
            running.store(false, Ordering::Relaxed);
        }
    });
    Ok(())
}

fn main() {
    let param_path = env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());

    let param = match param::get(&param_path) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Cannot read parameters from {}: {}", param_path, e);
            process::exit(1);
        }
    };

    let _logger = match init_logger(&param) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start logger: {}", e);
            process::exit(1);
        }
    };

    info!("opaccuracy v{}", opaccuracy::version());

    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = watch_signals(running.clone()) {
        warn!("Signal handling unavailable: {}", e);
    }

    let exp = match run(&param, running) {
        Ok(exp) => exp,
        Err(e) => {
            error!("Experiment failed: {}", e);
            process::exit(1);
        }
    };

    cinfo!(param.general.display_colorful, "{}", exp.display_results());

    if let Err(e) = exp.save_results() {
        error!("Cannot write results in {}: {}", param.output.dir, e);
        process::exit(1);
    }
    cinfo!(param.general.display_colorful, "Results written in \x1b[1m{}\x1b[0m", param.output.dir);

    if !param.general.save_exp.is_empty() {
        match exp.save_auto(&param.general.save_exp) {
            Ok(()) => info!("Experiment saved in {}", param.general.save_exp),
            Err(e) => error!("Cannot save experiment in {}: {}", param.general.save_exp, e),
        }
    }
}
