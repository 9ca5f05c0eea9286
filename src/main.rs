//! Interactive console for switching smart plugs off once their appliance is
//! verifiably idle.
//!
//! Lists the running plugs, lets the user pick one and a mode (real, dry run,
//! with record log), then drives one engine run while a consumer thread prints
//! the status events. Ctrl-C cancels the run without touching the relay.

use crossbeam::channel::bounded;
use log::{debug, error, warn};
use std::{
    io::{Write, stdin, stdout},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};
use thread_priority::{ThreadPriority, set_current_thread_priority};

use idleplug::device::{MeterConfig, PowerSwitch, SimulatedPlug, simulated_home};
use idleplug::engine::{
    EngineConfig, IdleShutdown, Outcome, StatusEvent, StatusSink, load_from_json,
};
use idleplug::utils::export::log_anomalous_run;

const WIDTH: usize = 80;
const CONFIG_FILE: &str = "idleplug.json";
const RECORD_LOG: &str = "logs/idleplug_records.csv";

#[derive(Debug, Clone, Copy)]
struct RunMode {
    dry_run: bool,
    log_records: bool,
}

fn main() {
    env_logger::init();
    intro();

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || cancel.store(true, Ordering::Release)) {
            error!("could not install the Ctrl-C handler: {err}");
        }
    }

    let base_config = load_config();
    let home = simulated_home(MeterConfig::default());

    loop {
        let Some(plug) = choose_plug(&home) else {
            break;
        };
        let Some(mode) = prompt_mode() else {
            break;
        };

        let mut config = base_config.clone();
        config.dry_run = mode.dry_run;
        run_one(plug, config, mode.log_records, cancel.clone());

        if cancel.load(Ordering::Acquire) {
            // Ctrl-C ends the whole session, not just the run.
            break;
        }
        let answer = prompt("Would you like to switch off another smart plug? (Y/N): ");
        if !answer.eq_ignore_ascii_case("y") {
            break;
        }
        println!("{}", "-".repeat(WIDTH));
    }

    println!();
    println!("{}", "=".repeat(WIDTH));
}

fn intro() {
    println!();
    println!("{}", "=".repeat(WIDTH));
    println!("{:=^width$}", " IDLEPLUG - SWITCH OFF WHEN IDLE ", width = WIDTH);
    println!("{}", "=".repeat(WIDTH));
    println!("Connecting to the home automation system to list running smart plugs...");
    println!("{}", "-".repeat(WIDTH));
}

fn load_config() -> EngineConfig {
    let path = Path::new(CONFIG_FILE);
    if !path.exists() {
        debug!("no {CONFIG_FILE}; using built-in defaults");
        return EngineConfig::default();
    }
    match load_from_json(path) {
        Ok(config) => {
            println!("Loaded configuration from {CONFIG_FILE}.");
            config
        }
        Err(err) => {
            warn!("ignoring {CONFIG_FILE}: {err}");
            EngineConfig::default()
        }
    }
}

/// Lists the plugs that report their switch as on and asks which one to watch.
fn choose_plug(home: &[SimulatedPlug]) -> Option<&SimulatedPlug> {
    let mut active: Vec<&SimulatedPlug> = home
        .iter()
        .filter(|plug| plug.switch_state().unwrap_or(false))
        .collect();
    active.sort_by_key(|plug| plug.name.to_lowercase());

    if active.is_empty() {
        println!("No active smart plugs found.");
        return None;
    }

    println!("The following smart plugs were detected:\n");
    for (idx, plug) in active.iter().enumerate() {
        println!("  ({}) {}", idx + 1, plug.name);
    }
    println!();
    println!("Which device would you like to switch off?");
    loop {
        let input = prompt("Press 'Enter' for (1) or choose a number: ");
        let choice = if input.is_empty() {
            1
        } else {
            match input.parse::<usize>() {
                Ok(n) if (1..=active.len()).contains(&n) => n,
                _ => {
                    println!(
                        "Input invalid. Please enter a number between 1 and {}.",
                        active.len()
                    );
                    continue;
                }
            }
        };
        println!("{}", "-".repeat(WIDTH));
        return Some(active[choice - 1]);
    }
}

fn prompt_mode() -> Option<RunMode> {
    println!("┌─────────────────────────────────────────────┐");
    println!("│     SELECT MODE                             │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Switch off when idle                    │");
    println!("│  2) Dry run (never switches)                │");
    println!("│  3) Switch off + write record log           │");
    println!("│  4) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    loop {
        let input = prompt("Select [1/2/3/4] (default: 1): ");
        match input.as_str() {
            "1" | "" => {
                return Some(RunMode {
                    dry_run: false,
                    log_records: false,
                });
            }
            "2" => {
                return Some(RunMode {
                    dry_run: true,
                    log_records: true,
                });
            }
            "3" => {
                return Some(RunMode {
                    dry_run: false,
                    log_records: true,
                });
            }
            "4" => return None,
            other => println!("Unrecognized option '{other}', please try again."),
        }
    }
}

fn run_one(plug: &SimulatedPlug, config: EngineConfig, log_records: bool, cancel: Arc<AtomicBool>) {
    println!("Switching off \"{}\" when idle...", plug.name);
    println!("{}", "-".repeat(WIDTH));

    let (tx, rx) = bounded::<StatusEvent>(256);
    let printer = thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            print_event(&event);
        }
    });

    // Console I/O must not starve the tick schedule.
    if let Err(err) = set_current_thread_priority(ThreadPriority::Max) {
        warn!("could not raise the polling thread priority: {err:?}");
    }

    let shutdown = IdleShutdown::new(plug, config, StatusSink::new(tx), cancel);
    let result = shutdown.run();
    drop(shutdown);
    let _ = printer.join();

    println!("{}", "-".repeat(WIDTH));
    match result {
        Ok(Outcome::Switched(records)) => {
            println!("Finished after {} power records.", records.len());
            if log_records {
                match log_anomalous_run(&records, Path::new(RECORD_LOG)) {
                    Ok(true) => println!("Records written to {RECORD_LOG}."),
                    Ok(false) => println!("Run looked clean; no records written."),
                    Err(err) => error!("could not write {RECORD_LOG}: {err}"),
                }
            }
        }
        Ok(_) => {}
        Err(err) => {
            error!("run against \"{}\" failed: {err}", plug.name);
            println!("Run failed: {err}");
        }
    }
}

fn print_event(event: &StatusEvent) {
    match event {
        StatusEvent::Acquiring { attempt } => {
            if *attempt == 1 {
                println!("Requesting current power data...");
            }
        }
        StatusEvent::SampleObserved {
            power_w,
            latency_s,
            duration_s,
        } => {
            println!(
                "Power: {power_w:7.2} W | Latency: {latency_s:5.2} s | Duration: {duration_s:4.2} s"
            );
        }
        StatusEvent::PhaseAdjusted {
            offset_s,
            step_s,
            lower_bound_s,
            latency_threshold_s,
        } => {
            debug!(
                "offset {offset_s:0.3} s, step {step_s:0.3} s, lower bound {lower_bound_s:0.3} s, threshold {latency_threshold_s:0.3} s"
            );
        }
        StatusEvent::SearchSettled { min_latency_s } => {
            println!("{}", "-".repeat(WIDTH));
            println!("Request schedule synchronized (minimal latency {min_latency_s:0.2} s).");
            println!("{}", "-".repeat(WIDTH));
        }
        StatusEvent::IdleConfirmed => {
            println!("Idle state detected. Switching off...");
        }
        StatusEvent::SwitchedOff { dry_run } => {
            if *dry_run {
                println!("Dry run: device qualified for switch-off; the relay was left on.");
            } else {
                println!("Device reported idle with low latency. Switched off.");
            }
        }
        StatusEvent::AlreadyOff => println!("Switch is already off. Nothing to do."),
        StatusEvent::ExternallyOff => {
            println!("The plug was switched off by someone else. Leaving it be.");
        }
        StatusEvent::Cancelled => println!("Cancelled. The relay was left untouched."),
        StatusEvent::TimedOut { reason } => println!("Gave up: {reason}."),
    }
}

fn prompt(text: &str) -> String {
    print!("{text}");
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}
