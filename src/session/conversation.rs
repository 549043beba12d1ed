//! Append-only conversation log
//!
//! A [`Conversation`] only ever grows. Every append is checked against the
//! tool-call pairing rule: each request in an assistant batch must be answered
//! by exactly one tool result before anything else is appended. Breaking that
//! rule is a bug in the caller and is reported as
//! [`AssistantError::InvariantViolation`].
//!
//! The orchestration loop does not append to the conversation directly. It
//! stages one user message's turns in an [`Exchange`] and commits them all at
//! once, so an aborted or cancelled request leaves no partial history behind.

use std::collections::HashSet;

use crate::error::{AssistantError, Result};

use super::types::Turn;

/// Tracks which tool calls still await a result.
#[derive(Debug, Clone, Default)]
struct Ledger {
    pending: Vec<String>,
    seen: HashSet<String>,
}

impl Ledger {
    /// Check `turn` against the pairing rule and record its effect.
    fn admit(&mut self, turn: &Turn) -> Result<()> {
        match turn {
            Turn::User { .. } => self.require_settled("user turn"),
            Turn::Assistant {
                text, tool_calls, ..
            } => {
                self.require_settled("assistant turn")?;
                match (text.is_some(), tool_calls.is_empty()) {
                    (false, true) => {
                        return Err(violation("assistant turn has neither text nor tool calls"))
                    }
                    (true, false) => {
                        return Err(violation("assistant turn has both text and tool calls"))
                    }
                    _ => {}
                }

                let mut batch = HashSet::new();
                for call in tool_calls {
                    if self.seen.contains(&call.id) || !batch.insert(call.id.as_str()) {
                        return Err(violation(&format!(
                            "tool call id '{}' is not unique in the conversation",
                            call.id
                        )));
                    }
                }
                for call in tool_calls {
                    self.seen.insert(call.id.clone());
                    self.pending.push(call.id.clone());
                }
                Ok(())
            }
            Turn::ToolResult { tool_call_id, .. } => {
                match self.pending.iter().position(|id| id == tool_call_id) {
                    Some(index) => {
                        self.pending.remove(index);
                        Ok(())
                    }
                    None => Err(violation(&format!(
                        "tool result for '{}' does not match a pending tool call",
                        tool_call_id
                    ))),
                }
            }
        }
    }

    fn require_settled(&self, what: &str) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(violation(&format!(
                "{} appended while tool calls are pending: {}",
                what,
                self.pending.join(", ")
            )))
        }
    }
}

fn violation(message: &str) -> AssistantError {
    AssistantError::InvariantViolation(message.to_string())
}

/// Ordered, append-only log of one chat session.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    turns: Vec<Turn>,
    ledger: Ledger,
}

impl Conversation {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            turns: Vec::new(),
            ledger: Ledger::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append one turn.
    ///
    /// # Errors
    ///
    /// [`AssistantError::InvariantViolation`] if the turn breaks the
    /// tool-call pairing rule. The conversation is left unchanged.
    pub fn append(&mut self, turn: Turn) -> Result<()> {
        self.ledger.admit(&turn)?;
        self.turns.push(turn);
        Ok(())
    }

    /// Owned copy of every turn, in order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Ids of tool calls still waiting for a result, in request order.
    pub fn pending_tool_calls(&self) -> &[String] {
        &self.ledger.pending
    }

    /// Start staging the turns of one user message.
    pub fn begin(&mut self) -> Exchange<'_> {
        let ledger = self.ledger.clone();
        Exchange {
            conversation: self,
            staged: Vec::new(),
            ledger,
        }
    }
}

/// Turns staged for one user message, committed atomically.
///
/// Dropping an exchange without calling [`Exchange::commit`] discards every
/// staged turn.
#[derive(Debug)]
pub struct Exchange<'a> {
    conversation: &'a mut Conversation,
    staged: Vec<Turn>,
    ledger: Ledger,
}

impl Exchange<'_> {
    /// Stage one turn, checked the same way [`Conversation::append`] checks it.
    pub fn append(&mut self, turn: Turn) -> Result<()> {
        self.ledger.admit(&turn)?;
        self.staged.push(turn);
        Ok(())
    }

    /// Committed turns followed by staged ones.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.conversation
            .turns
            .iter()
            .chain(self.staged.iter())
            .cloned()
            .collect()
    }

    /// Whether `id` was already used by a tool call, committed or staged.
    pub fn knows_tool_call(&self, id: &str) -> bool {
        self.ledger.seen.contains(id)
    }

    /// Append every staged turn to the conversation.
    ///
    /// # Errors
    ///
    /// [`AssistantError::InvariantViolation`] if tool calls are still pending;
    /// nothing is committed in that case.
    pub fn commit(self) -> Result<usize> {
        self.ledger.require_settled("commit")?;
        let count = self.staged.len();
        self.conversation.turns.extend(self.staged);
        self.conversation.ledger = self.ledger;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::ToolCallRequest;
    use crate::tools::{ToolErrorKind, ToolResult};
    use serde_json::json;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "list_files", json!({"directory": "/tmp"}))
    }

    fn ok(id: &str) -> Turn {
        Turn::tool_result(id, "list_files", ToolResult::Ok(json!([])))
    }

    #[test]
    fn test_append_and_snapshot() {
        let mut conversation = Conversation::new("s1");
        conversation.append(Turn::user("hi")).unwrap();
        conversation.append(Turn::assistant("hello")).unwrap();

        let snapshot = conversation.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].is_user());
        assert_eq!(snapshot[1].text(), Some("hello"));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut conversation = Conversation::new("s1");
        conversation.append(Turn::user("hi")).unwrap();
        let snapshot = conversation.snapshot();
        conversation.append(Turn::assistant("hello")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_tool_results_settle_pending_calls() {
        let mut conversation = Conversation::new("s1");
        conversation.append(Turn::user("list")).unwrap();
        conversation
            .append(Turn::assistant_tool_calls(vec![call("c1"), call("c2")]))
            .unwrap();
        assert_eq!(conversation.pending_tool_calls(), ["c1", "c2"]);

        conversation.append(ok("c1")).unwrap();
        conversation.append(ok("c2")).unwrap();
        assert!(conversation.pending_tool_calls().is_empty());
        conversation.append(Turn::assistant("done")).unwrap();
    }

    #[test]
    fn test_unmatched_tool_result_is_violation() {
        let mut conversation = Conversation::new("s1");
        conversation.append(Turn::user("hi")).unwrap();
        let err = conversation.append(ok("ghost")).unwrap_err();
        assert!(matches!(err, AssistantError::InvariantViolation(_)));
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_result_cannot_be_appended_twice() {
        let mut conversation = Conversation::new("s1");
        conversation
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .unwrap();
        conversation.append(ok("c1")).unwrap();
        assert!(conversation.append(ok("c1")).is_err());
    }

    #[test]
    fn test_assistant_while_pending_is_violation() {
        let mut conversation = Conversation::new("s1");
        conversation
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .unwrap();
        let err = conversation.append(Turn::assistant("too early")).unwrap_err();
        assert!(err.to_string().contains("pending"));
        assert!(conversation.append(Turn::user("again")).is_err());
    }

    #[test]
    fn test_duplicate_call_ids_rejected() {
        let mut conversation = Conversation::new("s1");
        assert!(conversation
            .append(Turn::assistant_tool_calls(vec![call("c1"), call("c1")]))
            .is_err());

        conversation
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .unwrap();
        conversation.append(ok("c1")).unwrap();
        assert!(conversation
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .is_err());
    }

    #[test]
    fn test_empty_or_mixed_assistant_turn_rejected() {
        let mut conversation = Conversation::new("s1");
        assert!(conversation
            .append(Turn::assistant_tool_calls(Vec::new()))
            .is_err());

        let mixed = Turn::Assistant {
            text: Some("let me look".into()),
            tool_calls: vec![call("c1")],
            timestamp: chrono::Utc::now(),
        };
        assert!(conversation.append(mixed).is_err());
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_exchange_commit() {
        let mut conversation = Conversation::new("s1");
        let mut exchange = conversation.begin();
        exchange.append(Turn::user("list /tmp")).unwrap();
        exchange
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .unwrap();
        exchange
            .append(Turn::tool_result(
                "c1",
                "list_files",
                ToolResult::error(ToolErrorKind::ToolUnavailable, "down"),
            ))
            .unwrap();
        assert_eq!(exchange.snapshot().len(), 3);
        exchange.append(Turn::assistant("It is down.")).unwrap();

        assert_eq!(exchange.commit().unwrap(), 4);
        assert_eq!(conversation.len(), 4);
    }

    #[test]
    fn test_dropped_exchange_leaves_no_trace() {
        let mut conversation = Conversation::new("s1");
        conversation.append(Turn::user("first")).unwrap();
        conversation.append(Turn::assistant("one")).unwrap();

        {
            let mut exchange = conversation.begin();
            exchange.append(Turn::user("second")).unwrap();
            exchange
                .append(Turn::assistant_tool_calls(vec![call("c9")]))
                .unwrap();
            assert_eq!(exchange.snapshot().len(), 4);
        }

        assert_eq!(conversation.len(), 2);
        assert!(conversation.pending_tool_calls().is_empty());
        // The abandoned id was never committed, so it may be reused
        conversation
            .append(Turn::assistant_tool_calls(vec![call("c9")]))
            .unwrap();
    }

    #[test]
    fn test_commit_with_pending_calls_is_violation() {
        let mut conversation = Conversation::new("s1");
        let mut exchange = conversation.begin();
        exchange.append(Turn::user("x")).unwrap();
        exchange
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .unwrap();
        assert!(exchange.commit().is_err());
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_exchange_sees_committed_ids() {
        let mut conversation = Conversation::new("s1");
        conversation
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .unwrap();
        conversation.append(ok("c1")).unwrap();

        let mut exchange = conversation.begin();
        assert!(exchange.knows_tool_call("c1"));
        assert!(!exchange.knows_tool_call("c2"));
        assert!(exchange
            .append(Turn::assistant_tool_calls(vec![call("c1")]))
            .is_err());
    }
}
