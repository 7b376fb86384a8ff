//! Interactive read loop

use crate::session::Session;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user typed `exit` or `quit`
    Command,
    /// Input ended
    EndOfInput,
    /// The shutdown signal fired
    Interrupted,
    /// Input could not be read, e.g. it was not UTF-8
    InputError,
}

fn is_exit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Converse until the user leaves, input ends, or `shutdown` resolves
///
/// Blank lines are ignored. The session is left open; closing it is up to
/// the caller.
pub async fn run<R, W, S>(
    session: &mut Session,
    input: R,
    output: &mut W,
    shutdown: S,
) -> std::io::Result<ExitReason>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    return Ok(ExitReason::InputError);
                }
            },
            _ = &mut shutdown => {
                output.write_all(b"\n[ctrl-c] bye!\n").await?;
                return Ok(ExitReason::Interrupted);
            }
        };

        let Some(line) = line else {
            return Ok(ExitReason::EndOfInput);
        };
        let line = line.trim();
        if is_exit_command(line) {
            info!("Leaving on user command");
            return Ok(ExitReason::Command);
        }
        if line.is_empty() {
            continue;
        }

        let reply = tokio::select! {
            turn = session.turn(line) => match turn {
                Ok(turn) => turn.reply,
                Err(unremembered) => {
                    warn!("{}", unremembered);
                    unremembered.reply
                }
            },
            _ = &mut shutdown => {
                output.write_all(b"\n[ctrl-c] bye!\n").await?;
                return Ok(ExitReason::Interrupted);
            }
        };

        output
            .write_all(format!("\nGhost: {}\n", reply).as_bytes())
            .await?;
        output.flush().await?;
    }
}
