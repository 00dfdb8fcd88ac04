// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! Decodes a captured Source Capabilities block and answers queries on it

use argh::FromArgs;

use pdcaps_rs::backends::capture::CaptureBackend;
use pdcaps_rs::controller::VoltageSelector;
use pdcaps_rs::session::Session;
use pdcaps_rs::Error;
use pdcaps_rs::Millivolt;
use pdcaps_rs::Result;

#[derive(FromArgs)]
/// Decode USB-PD source capabilities
struct Args {
    /// enable verbose mode
    #[argh(switch, short = 'v')]
    verbose: bool,
    /// hex dump of the capability block read from the controller
    #[argh(option)]
    capture: String,
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Summary(SummaryArgs),
    Find(FindArgs),
    Power(PowerArgs),
    Select(SelectArgs),
}

#[derive(FromArgs)]
/// Print every advertised capability
#[argh(subcommand, name = "summary")]
struct SummaryArgs {}

#[derive(FromArgs)]
/// Print the first capability that can supply a voltage
#[argh(subcommand, name = "find")]
struct FindArgs {
    /// the voltage in millivolts
    #[argh(positional)]
    millivolts: u32,
}

#[derive(FromArgs)]
/// Print the power and current available at a voltage
#[argh(subcommand, name = "power")]
struct PowerArgs {
    /// the voltage in millivolts
    #[argh(positional)]
    millivolts: u32,
}

#[derive(FromArgs)]
/// Request an output voltage: 5, 9, 12, 15, 20, 28, pps or avs
#[argh(subcommand, name = "select")]
struct SelectArgs {
    /// the voltage selection
    #[argh(positional)]
    voltage: VoltageSelector,
    /// the PPS or AVS output voltage in millivolts
    #[argh(option)]
    millivolts: Option<u32>,
}

fn run(args: Args) -> Result<()> {
    let mut session = Session::new(CaptureBackend::from_file(&args.capture)?);
    session.refresh()?;
    session.update_status()?;

    match args.command {
        Command::Summary(_) => print!("{}", session.render_summary()?),
        Command::Find(find) => {
            let voltage = Millivolt(find.millivolts);
            match session.find_by_voltage(voltage)? {
                Some(entry) => println!("{entry}"),
                None => println!("{voltage:?} is not supported"),
            }
        }
        Command::Power(power) => {
            let voltage = Millivolt(power.millivolts);
            let (watts, current) = session
                .power_at_voltage(voltage)?
                .ok_or(Error::NotFound {
                    voltage,
                    #[cfg(feature = "backtrace")]
                    backtrace: std::backtrace::Backtrace::capture(),
                })?;
            println!("{watts:.1}W ({:.2}A)", current.amps());
        }
        Command::Select(select) => {
            session.select_voltage(select.voltage)?;
            match (select.voltage, select.millivolts) {
                (VoltageSelector::Pps, Some(mv)) => session.configure_pps(Millivolt(mv))?,
                (VoltageSelector::Avs, Some(mv)) => session.configure_avs(Millivolt(mv))?,
                (_, Some(_)) => log::warn!("--millivolts only applies to pps and avs"),
                (_, None) => {}
            }

            session.update_status()?;
            println!("Requests sent: {:?}", session.controller().requests());
            println!(
                "{} {:.2}A {}W",
                session.protocol().name(),
                session.available_current().amps(),
                session.current_power_w()
            );
        }
    }

    Ok(())
}

fn main() {
    let args: Args = argh::from_env();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::builder().filter_level(level).init();

    if let Err(e) = run(args) {
        eprintln!("pdcaps: {e}");
        std::process::exit(1);
    }
}
