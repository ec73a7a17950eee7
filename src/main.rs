use std::str::FromStr;
use std::time::Duration;

use anyhow::Error;
use dining::{AcquirePolicy, Config, MillisRange, Observer, Table};
use env_logger::Env;
use log::{info, warn};
use pico_args::Arguments;

const HELP: &str = "\
Run the dining philosophers at a round table

USAGE:
  dining [OPTIONS]

OPTIONS:
  --philosophers N      Number of philosophers (and forks)  [default: env DINING_PHILOSOPHERS or 5]
  --meals M             Meals each philosopher eats         [default: env DINING_MEALS or 7]
  --think MIN..MAX      Thinking time in ms                 [default: 3000..6000]
  --eat MIN..MAX        Eating time in ms                   [default: 5000..10000]
  --policy NAME         left-first | last-reversed | alternating | backoff
                                                            [default: env DINING_POLICY or last-reversed]
  --grab-pause MS       Pause between the first and second fork  [default: 0]
  --watch MS            Table redraw interval in ms         [default: 100]

FLAGS:
  --quiet               Do not draw the table
  -h, --help            Print help information

ENVIRONMENT:
  RUST_LOG              Log filter (e.g. debug)
";

struct Args {
    config: Config,
    watch: Option<Duration>,
}

fn env_or<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_args(mut pargs: Arguments) -> Result<Args, Error> {
    let defaults = Config::default();

    let config = Config {
        philosophers: pargs
            .opt_value_from_str::<_, usize>("--philosophers")?
            .or_else(|| env_or("DINING_PHILOSOPHERS"))
            .unwrap_or(defaults.philosophers),
        meals: pargs
            .opt_value_from_str::<_, usize>("--meals")?
            .or_else(|| env_or("DINING_MEALS"))
            .unwrap_or(defaults.meals),
        think: pargs
            .opt_value_from_str::<_, MillisRange>("--think")?
            .unwrap_or(defaults.think),
        eat: pargs
            .opt_value_from_str::<_, MillisRange>("--eat")?
            .unwrap_or(defaults.eat),
        policy: pargs
            .opt_value_from_str::<_, AcquirePolicy>("--policy")?
            .or_else(|| env_or("DINING_POLICY"))
            .unwrap_or(defaults.policy),
        grab_pause: pargs
            .opt_value_from_str::<_, u64>("--grab-pause")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.grab_pause),
        ..defaults
    };

    let watch = pargs
        .opt_value_from_str::<_, u64>("--watch")?
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(100));
    let quiet = pargs.contains("--quiet");

    let rest = pargs.finish();
    if !rest.is_empty() {
        warn!("ignoring unknown arguments: {:?}", rest);
    }

    Ok(Args {
        config,
        watch: (!quiet).then_some(watch),
    })
}

fn main() -> Result<(), Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let args = parse_args(pargs)?;
    let table = Table::new(&args.config)?;

    if args.config.policy.may_deadlock() {
        warn!(
            "policy {} can deadlock, the table may never finish",
            args.config.policy
        );
    }

    let observer = match args.watch {
        Some(interval) => Some(Observer::spawn(table.view(), interval)?),
        None => None,
    };

    let summary = table.run()?;

    if let Some(observer) = observer {
        observer.stop();
    }

    info!("meals per philosopher: {:?}", summary.meals);
    Ok(())
}
