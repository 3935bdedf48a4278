//! The line-oriented prompt shown whenever reporters produced something new.
//!
//! The operator sees a numbered listing of this round's reports and answers
//! at the `cmd>>>` prompt: `preview 1-3`, `publish 2,4` (or `post`), a blank
//! line to move on, or `q` to stop the program.

use anyhow::Result;
use pleiades_reporter_core::commands::{Command, Disposition, PROMPT};
use pleiades_reporter_core::looper::Looper;
use pleiades_reporter_core::report::{Report, RULE_WIDTH};
use pleiades_reporter_core::selection::parse_selection;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info};

/// Print the headline and numbered listing for freshly generated reports.
pub fn print_listing<W: Write>(output: &mut W, reports: &[Report]) -> Result<()> {
    writeln!(output, "{} new reports have been generated:", reports.len())?;
    for (i, report) in reports.iter().enumerate() {
        writeln!(output, "{}", report.listing_line(i + 1))?;
    }
    Ok(())
}

/// Show the prompt, read one command and act on it.
///
/// End of input counts as `quit`.
pub async fn get_user_disposition<R, W>(
    input: &mut R,
    output: &mut W,
    reports: &[Report],
    looper: &mut Looper,
) -> Result<Disposition>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(output, "{PROMPT}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(Disposition::Quit);
    }

    let command = Command::parse(&line);
    match &command {
        Command::Done | Command::Quit => {}
        Command::Invalid(cmd) => {
            info!(command = %cmd, "Invalid command at prompt");
            writeln!(output, "Invalid command.")?;
        }
        Command::Preview(predicate) => match parse_selection(predicate, reports.len()) {
            Ok(indices) => {
                for i in indices {
                    writeln!(output, "{}", reports[i].preview())?;
                }
                writeln!(output, "{}", "-".repeat(RULE_WIDTH))?;
            }
            Err(e) => {
                writeln!(output, "{e}")?;
                return Ok(Disposition::Again);
            }
        },
        Command::Publish(predicate) => match parse_selection(predicate, reports.len()) {
            Ok(indices) => {
                let selected: Vec<Report> = indices.into_iter().map(|i| reports[i].clone()).collect();
                match looper.publish(&selected) {
                    Ok(count) => writeln!(
                        output,
                        "Queued {count} posts on {} channels.",
                        looper.channels().len()
                    )?,
                    Err(e) => {
                        error!(error = %e, "Failed to queue posts");
                        writeln!(output, "Failed to queue posts: {e}")?;
                        return Ok(Disposition::Again);
                    }
                }
            }
            Err(e) => {
                writeln!(output, "{e}")?;
                return Ok(Disposition::Again);
            }
        },
    }
    Ok(command.disposition())
}

/// Keep prompting until the operator is done with this batch or quits.
pub async fn prompt_until_done<R, W>(
    input: &mut R,
    output: &mut W,
    reports: &[Report],
    looper: &mut Looper,
) -> Result<Disposition>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        match get_user_disposition(input, output, reports, looper).await? {
            Disposition::Again => continue,
            other => return Ok(other),
        }
    }
}
