//! The telepathist setup pass: distill a recorded session's spans into
//! turn and phase summaries, then have the telepathist review them.

use crate::app::AppError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vox_agents::{AgentCall, AgentRuntime, Summarizer, Telepathist};
use vox_core::{DecisionMode, PlayerId, PlayerParams, TraceId};
use vox_provider_anthropic::Anthropic;
use vox_telemetry::{PhaseSummary, SpanQuery, TelepathistStore, TurnSummary, read_spans};

/// Turns per phase summary.
const PHASE_SPAN: u32 = 25;

/// Run the full pass over one session database and print the review.
pub async fn run(db: &Path, api_key: &str) -> Result<(), AppError> {
    let spans = read_spans(db.to_path_buf(), SpanQuery::default())
        .await
        .map_err(|e| AppError::Init(e.to_string()))?;
    if spans.is_empty() {
        return Err(AppError::Init(format!(
            "no spans in {} — is this a session database?",
            db.display()
        )));
    }
    let store =
        TelepathistStore::open_for_session(db).map_err(|e| AppError::Init(e.to_string()))?;

    let runtime = AgentRuntime::builder(Anthropic::new(api_key))
        .agent(Arc::new(Summarizer::new(Some(store.clone()))))
        .agent(Arc::new(Telepathist::new(store.clone())))
        .build();
    let params = Arc::new(tokio::sync::Mutex::new(PlayerParams::new(
        PlayerId(0),
        0,
        DecisionMode::Strategy,
    )));
    let cancel = CancellationToken::new();

    // One digest per turn, summarized once each.
    let mut by_turn: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for span in &spans {
        let line = format!(
            "{} ({:?}, {} ms): {}",
            span.name,
            span.status,
            span.duration_ms(),
            span.attributes
        );
        by_turn.entry(span.turn).or_default().push(line);
    }

    let existing: BTreeMap<u32, TurnSummary> = store
        .turn_summaries()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .into_iter()
        .map(|s| (s.turn, s))
        .collect();

    for (turn, lines) in &by_turn {
        if existing.contains_key(turn) {
            continue;
        }
        let outcome = runtime
            .call(
                AgentCall::new(
                    "summarizer",
                    serde_json::json!({
                        "Text": lines.join("\n"),
                        "Instruction": format!(
                            "Summarize what the strategist did on turn {turn} in one \
                             short paragraph: the decision, the rationale, anything \
                             that failed."
                        ),
                    }),
                    *turn,
                    TraceId::new("telepathist-setup"),
                ),
                &params,
                &cancel,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let full = outcome.text;
        let short = first_sentence(&full);
        store
            .put_turn_summary(TurnSummary {
                turn: *turn,
                short_summary: short,
                full_summary: full,
                model: "summarizer".into(),
            })
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        tracing::info!(turn, "turn summarized");
    }

    // Phase summaries over contiguous chunks of turns.
    let turn_summaries = store
        .turn_summaries()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let mut chunks: BTreeMap<u32, Vec<&TurnSummary>> = BTreeMap::new();
    for summary in &turn_summaries {
        chunks
            .entry(summary.turn / PHASE_SPAN)
            .or_default()
            .push(summary);
    }
    for summaries in chunks.values() {
        let (from_turn, to_turn) = match (summaries.first(), summaries.last()) {
            (Some(first), Some(last)) => (first.turn, last.turn),
            _ => continue,
        };
        let text = summaries
            .iter()
            .map(|s| format!("Turn {}: {}", s.turn, s.full_summary))
            .collect::<Vec<_>>()
            .join("\n");
        let outcome = runtime
            .call(
                AgentCall::new(
                    "summarizer",
                    serde_json::json!({
                        "Text": text,
                        "Instruction": format!(
                            "Summarize turns {from_turn}-{to_turn} as one phase of the \
                             game: the strategic arc, the pivots, the mistakes."
                        ),
                    }),
                    to_turn,
                    TraceId::new("telepathist-setup"),
                ),
                &params,
                &cancel,
            )
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        store
            .put_phase_summary(PhaseSummary {
                from_turn,
                to_turn,
                summary: outcome.text,
                model: "summarizer".into(),
            })
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        tracing::info!(from_turn, to_turn, "phase summarized");
    }

    // The review itself.
    let review = runtime
        .call(
            AgentCall::new(
                "telepathist",
                serde_json::json!({"Instruction": "Review this session's decision-making."}),
                0,
                TraceId::new("telepathist-review"),
            ),
            &params,
            &cancel,
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    println!("{}", review.text);
    Ok(())
}

fn first_sentence(text: &str) -> String {
    match text.find(['.', '\n']) {
        Some(end) => text[..=end.min(text.len() - 1)].trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sentence_cuts_at_period_or_newline() {
        assert_eq!(
            first_sentence("Settled the capital. Then queued a scout."),
            "Settled the capital."
        );
        assert_eq!(first_sentence("One line\nTwo line"), "One line");
        assert_eq!(first_sentence("no terminator"), "no terminator");
    }
}
