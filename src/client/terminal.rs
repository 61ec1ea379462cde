//! Interactive chat over stdin/stdout.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::controller::{ChatFormController, PendingTurn, ReplyOrdering, TurnOutcome};
use super::surface::TerminalSurface;
use super::transport::ChatTransport;

/// Chat on the terminal until stdin closes.
pub async fn run<T: ChatTransport>(transport: T, ordering: ReplyOrdering) -> anyhow::Result<()> {
    run_with(TerminalSurface::stdout(), transport, ordering, tokio::io::stdin()).await?;
    Ok(())
}

/// Submit every line read from `input` as a query.
///
/// Lines are submitted as soon as they are read, without waiting for the
/// previous reply. Once `input` is exhausted, waits for all pending turns,
/// tears the controller down and returns each turn's outcome in submission
/// order.
pub async fn run_with<W, T, R>(
    surface: TerminalSurface<W>,
    transport: T,
    ordering: ReplyOrdering,
    input: R,
) -> anyhow::Result<Vec<TurnOutcome>>
where
    W: Write + Send + 'static,
    T: ChatTransport,
    R: AsyncRead + Unpin,
{
    let Some(controller) = ChatFormController::bind(surface, transport, ordering) else {
        return Ok(Vec::new());
    };

    let mut lines = BufReader::new(input).lines();
    let mut pending = Vec::new();

    while let Some(line) = lines.next_line().await? {
        controller.with_surface_mut(|surface| surface.set_query(line));
        if let Some(turn) = controller.submit() {
            pending.push(turn);
        }
    }

    tracing::debug!(name: "terminal.input.closed", pending = pending.len(), "Input closed, waiting for replies");

    let outcomes = futures::future::join_all(pending.into_iter().map(PendingTurn::finished)).await;
    controller.teardown();
    Ok(outcomes)
}
