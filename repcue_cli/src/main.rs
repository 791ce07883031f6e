use clap::{Parser, Subcommand};
use repcue_core::effects::NoWakeLock;
use repcue_core::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;

const ACTIVITY_LOG: &str = "activity.jsonl";

#[derive(Parser)]
#[command(name = "repcue")]
#[command(about = "Interval timer for time- and rep-based exercises", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available exercises
    List,

    /// Time a single exercise
    Run {
        /// Exercise id (see `repcue list`)
        exercise: String,

        /// Custom duration in seconds (time-based exercises only)
        #[arg(long)]
        duration: Option<u32>,

        /// Dry run - show the resolved plan without timing anything
        #[arg(long)]
        dry_run: bool,

        /// Log this run to the activity log even if logging is off in config
        #[arg(long)]
        record: bool,
    },

    /// Run a workout of several exercises
    Workout {
        /// Exercise ids, in order
        exercises: Vec<String>,

        /// Load the workout from a TOML file instead
        #[arg(long, conflicts_with = "exercises")]
        file: Option<PathBuf>,

        /// Rest between exercises in seconds
        #[arg(long)]
        rest: Option<u32>,

        /// Dry run - show the resolved plan without timing anything
        #[arg(long)]
        dry_run: bool,

        /// Log this workout to the activity log even if logging is off in config
        #[arg(long)]
        record: bool,
    },

    /// Show the activity log
    History {
        /// Number of most recent entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    repcue_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command {
        Commands::List => cmd_list(&config),
        Commands::Run {
            exercise,
            duration,
            dry_run,
            record,
        } => cmd_run(&data_dir, &config, &exercise, duration, dry_run, record),
        Commands::Workout {
            exercises,
            file,
            rest,
            dry_run,
            record,
        } => {
            let workout = match file {
                Some(path) => load_workout(&path)?,
                None => workout_from_ids(&exercises, rest),
            };
            cmd_workout(&data_dir, &config, workout, dry_run, record)
        }
        Commands::History { limit } => cmd_history(&data_dir, limit),
    }
}

fn cmd_list(config: &Config) -> Result<()> {
    let catalog = config.catalog()?;

    println!("{:<20} {:<24} DEFAULT", "ID", "NAME");
    for spec in catalog.sorted() {
        println!("{:<20} {:<24} {}", spec.id, spec.name, describe_defaults(spec));
    }
    Ok(())
}

fn cmd_run(
    data_dir: &Path,
    config: &Config,
    exercise: &str,
    duration: Option<u32>,
    dry_run: bool,
    record: bool,
) -> Result<()> {
    let catalog = config.catalog()?;
    let settings = config.timer_settings()?;

    let spec = catalog.resolve(exercise)?;
    let overrides = StepOverrides {
        duration_seconds: duration,
        ..Default::default()
    };
    let run_config = RunConfig::resolve(spec, &overrides, settings.set_rest_seconds)?;

    println!("\n  {}", spec.name);
    println!("  {}", describe_run(&run_config));
    println!();

    if dry_run {
        println!("[Dry run - nothing timed or logged]");
        return Ok(());
    }

    let mut runner = build_runner(data_dir, config, catalog, settings, record);
    runner.start(exercise, duration)?;
    drive(&mut runner, spawn_controls())?;
    Ok(())
}

fn cmd_workout(
    data_dir: &Path,
    config: &Config,
    workout: Workout,
    dry_run: bool,
    record: bool,
) -> Result<()> {
    let catalog = config.catalog()?;
    let settings = config.timer_settings()?;

    if workout.steps.is_empty() {
        return Err(Error::EmptyWorkout);
    }

    let mut steps = workout.steps.clone();
    steps.sort_by_key(|step| step.order);

    println!("\n  {}", workout.name);
    let mut total: u32 = 0;
    for (i, step) in steps.iter().enumerate() {
        let spec = catalog.resolve(&step.exercise_id)?;
        let run_config = RunConfig::resolve(spec, &step.overrides, settings.set_rest_seconds)?;
        total = total.saturating_add(run_config.effective_seconds());

        let rest = step.rest_seconds.unwrap_or(settings.default_rest_seconds);
        let rest_note = if i + 1 < steps.len() && rest > 0 {
            format!(", then rest {}s", rest)
        } else {
            String::new()
        };
        println!(
            "  {}. {} - {}{}",
            i + 1,
            spec.name,
            describe_run(&run_config),
            rest_note
        );
    }
    println!("  Work: {}s", total);
    println!();

    if dry_run {
        println!("[Dry run - nothing timed or logged]");
        return Ok(());
    }

    let mut runner = build_runner(data_dir, config, catalog, settings, record);
    runner.start_workout(workout)?;
    drive(&mut runner, spawn_controls())?;
    Ok(())
}

fn cmd_history(data_dir: &Path, limit: usize) -> Result<()> {
    let entries = read_entries(&data_dir.join(ACTIVITY_LOG))?;
    if entries.is_empty() {
        println!("No activity recorded yet.");
        return Ok(());
    }

    let skip = entries.len().saturating_sub(limit);
    for entry in &entries[skip..] {
        let outcome = match entry.outcome {
            ActivityOutcome::Completed => "completed",
            ActivityOutcome::ManualStop => "stopped",
        };
        let kind = match entry.kind {
            ActivityKind::Single => "single",
            ActivityKind::Workout => "workout",
        };
        println!(
            "{}  {:<24} {:>5}s  {:<8} {}",
            entry.completed_at.format("%Y-%m-%d %H:%M"),
            entry.subject_name,
            entry.duration_seconds,
            kind,
            outcome
        );
    }
    Ok(())
}

fn build_runner(
    data_dir: &Path,
    config: &Config,
    catalog: Catalog,
    settings: TimerSettings,
    record: bool,
) -> Runner {
    let consent = record || config.privacy.activity_logging;
    if !consent {
        tracing::debug!("Activity logging disabled for this run");
    }

    Runner::new(
        Session::new(catalog, settings),
        Box::new(SystemClock::new()),
        EffectDispatcher::new(
            Box::new(TerminalCues),
            Box::new(JsonlRecorder::new(data_dir.join(ACTIVITY_LOG))),
            Box::new(consent),
            Box::new(NoWakeLock),
        ),
    )
}

/// Keyboard commands accepted while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// Stop and log the work done so far
    Stop,
    /// Mark the current exercise done
    Done,
    /// Abandon the run without logging
    Reset,
}

fn parse_control(input: &str) -> Option<Control> {
    match input.trim().to_lowercase().as_str() {
        "" | "s" => Some(Control::Stop),
        "d" => Some(Control::Done),
        "r" => Some(Control::Reset),
        _ => None,
    }
}

/// Read commands from stdin on a background thread
///
/// The channel disconnects at end of input, after which the run just
/// plays out.
fn spawn_controls() -> Receiver<Control> {
    println!("Press Enter to stop");
    println!("  'd' + Enter to mark the current exercise done");
    println!("  'r' + Enter to reset without logging");
    println!();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_control(&line) {
                Some(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                None => println!("Unknown command '{}'", line.trim()),
            }
        }
    });
    rx
}

/// Tick in real time until the session goes idle, applying any commands
/// that arrive in between
fn drive(runner: &mut Runner, controls: Receiver<Control>) -> Result<()> {
    let mut controls = Some(controls);
    let mut last_countdown = None;
    while let Some((handle, interval)) = runner.tick_schedule() {
        let received = controls.as_ref().map(|rx| rx.recv_timeout(interval));
        match received {
            Some(Ok(control)) => {
                tracing::debug!("Control: {:?}", control);
                match control {
                    Control::Stop => runner.stop(false),
                    Control::Done => runner.stop(true),
                    Control::Reset => runner.reset(),
                }
            }
            Some(Err(RecvTimeoutError::Timeout)) => runner.tick(handle),
            Some(Err(RecvTimeoutError::Disconnected)) => {
                controls = None;
                continue;
            }
            None => {
                thread::sleep(interval);
                runner.tick(handle);
            }
        }

        let state = runner.timer_state();
        if state.countdown_remaining != last_countdown {
            if let Some(remaining) = state.countdown_remaining {
                println!("  {}...", remaining);
                io::stdout().flush()?;
            }
            last_countdown = state.countdown_remaining;
        }
    }
    Ok(())
}

fn load_workout(path: &Path) -> Result<Workout> {
    let contents = std::fs::read_to_string(path)?;
    let workout: Workout = toml::from_str(&contents)?;
    Ok(workout)
}

fn workout_from_ids(ids: &[String], rest: Option<u32>) -> Workout {
    let steps = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let step = WorkoutStep::new(id.clone(), i as u32);
            match rest {
                Some(seconds) => step.with_rest(seconds),
                None => step,
            }
        })
        .collect::<Vec<_>>();
    Workout::from(steps)
}

fn describe_defaults(spec: &ExerciseSpec) -> String {
    match &spec.defaults {
        ExerciseDefaults::TimeBased { duration_seconds } => format!("{}s", duration_seconds),
        ExerciseDefaults::RepetitionBased {
            sets,
            reps,
            rep_duration_seconds,
        } => format!("{} x {} @ {}s/rep", sets, reps, rep_duration_seconds),
    }
}

fn describe_run(config: &RunConfig) -> String {
    match config {
        RunConfig::Timed { target_seconds } => format!("{} seconds", target_seconds),
        RunConfig::Reps(plan) => format!(
            "{} sets x {} reps @ {}s/rep, {}s between sets",
            plan.sets_total, plan.reps_total, plan.per_rep_seconds, plan.set_rest_seconds
        ),
    }
}

fn describe_upcoming(announcement: &Announcement) -> String {
    match announcement {
        Announcement::Set {
            set,
            total_sets,
            reps,
        } => format!("set {}/{} ({} reps)", set, total_sets, reps),
        Announcement::Exercise { name, .. } => name.clone(),
    }
}

/// Prints cues as lines on stdout
struct TerminalCues;

impl CueDispatcher for TerminalCues {
    fn play(&mut self, cue: &Cue) -> Result<()> {
        let mut out = io::stdout().lock();
        match cue {
            Cue::Start {
                exercise_id,
                announcement,
            } => match announcement {
                Some(upcoming) => {
                    writeln!(out, "▶ Go: {} - {}", exercise_id, describe_upcoming(upcoming))?
                }
                None => writeln!(out, "▶ Go: {}", exercise_id)?,
            },
            Cue::Interval { second } => writeln!(out, "  · {}s", second)?,
            Cue::RestStart { seconds, upcoming } => writeln!(
                out,
                "⏸ Rest {}s - next: {}",
                seconds,
                describe_upcoming(upcoming)
            )?,
            Cue::RestEnd { upcoming } => {
                writeln!(out, "  Rest over - {}", describe_upcoming(upcoming))?
            }
            Cue::Completion { subject_id } => writeln!(out, "✓ {} complete!", subject_id)?,
        }
        out.flush()?;
        Ok(())
    }
}
