use mcai_contracts::events::{EventPayload, EventWriter};
use mcai_contracts::presets::ProviderBinding;
use mcai_contracts::prompts::{build_pair, violation_correction, EMPTY_CODE_CORRECTION};
use mcai_contracts::request::{GenerationOutcome, GenerationRequest};
use mcai_contracts::response::decompose;
use mcai_contracts::validation::{ComplianceCheck, ValidationResult};
use mcai_contracts::McaiError;
use serde::Serialize;
use serde_json::{json, Value};

use crate::gateway::{error_chain_text, CompletionGateway};

pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Initial,
    EmptyCodeCorrection,
    ViolationCorrection,
}

impl AttemptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::EmptyCodeCorrection => "empty_code_correction",
            Self::ViolationCorrection => "violation_correction",
        }
    }

    /// Extra system directive for this attempt, built from the one before it.
    pub fn corrective_note(self, previous: Option<&AttemptReport>) -> Option<String> {
        match self {
            Self::Initial => None,
            Self::EmptyCodeCorrection => Some(EMPTY_CODE_CORRECTION.to_string()),
            Self::ViolationCorrection => previous
                .map(|report| violation_correction(report.validation.violations())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub kind: AttemptKind,
    pub feedback: Vec<String>,
    pub code: String,
    pub validation: ValidationResult,
}

impl AttemptReport {
    pub fn has_code(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

/// Transition table of the attempt budget.
///
/// Blank code after the first attempt asks again for code only. Non-blank
/// but non-compliant code gets one violation-listing correction. Nothing
/// follows a violation correction. The two checks run one after the other,
/// so an empty-code retry that returns invalid code still gets the
/// violation correction as its third call.
pub fn next_attempt(last: &AttemptReport) -> Option<AttemptKind> {
    match last.kind {
        AttemptKind::Initial if !last.has_code() => Some(AttemptKind::EmptyCodeCorrection),
        AttemptKind::Initial | AttemptKind::EmptyCodeCorrection
            if last.has_code() && !last.validation.is_ok() =>
        {
            Some(AttemptKind::ViolationCorrection)
        }
        _ => None,
    }
}

pub struct Orchestrator<'a> {
    gateway: &'a dyn CompletionGateway,
    validator: &'a dyn ComplianceCheck,
    events: EventWriter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        gateway: &'a dyn CompletionGateway,
        validator: &'a dyn ComplianceCheck,
        events: EventWriter,
    ) -> Self {
        Self {
            gateway,
            validator,
            events,
        }
    }

    pub fn run(
        &self,
        binding: &ProviderBinding,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, McaiError> {
        let mut report = self.attempt(AttemptKind::Initial, None, binding, request, 1)?;
        let mut calls = 1;
        while let Some(kind) = next_attempt(&report) {
            if calls >= MAX_ATTEMPTS {
                break;
            }
            calls += 1;
            let note = kind.corrective_note(Some(&report));
            report = self.attempt(kind, note.as_deref(), binding, request, calls)?;
        }

        if !report.has_code() {
            tracing::warn!(
                device = request.target.as_str(),
                attempts = calls,
                "no usable code returned; using fallback stub"
            );
            self.record(
                "fallback_used",
                json!({ "target": request.target.as_str(), "attempts": calls }),
            );
            return Ok(GenerationOutcome {
                code: request.target.fallback_stub().to_string(),
                feedback: report.feedback,
            });
        }

        if !report.validation.is_ok() {
            tracing::info!(
                violations = ?report.validation.violations(),
                "returning best-effort code after final attempt"
            );
        }
        Ok(GenerationOutcome {
            code: report.code,
            feedback: report.feedback,
        })
    }

    fn attempt(
        &self,
        kind: AttemptKind,
        note: Option<&str>,
        binding: &ProviderBinding,
        request: &GenerationRequest,
        number: usize,
    ) -> Result<AttemptReport, McaiError> {
        let prompt = build_pair(request, note);
        tracing::debug!(
            attempt = number,
            kind = kind.as_str(),
            model = binding.model_id.as_str(),
            "calling provider"
        );
        let raw = match self.gateway.complete(binding, &prompt) {
            Ok(raw) => raw,
            Err(err) => {
                let detail = error_chain_text(&err, 512);
                self.record(
                    "attempt_failed",
                    json!({ "attempt": number, "kind": kind, "error": detail }),
                );
                return Err(McaiError::Provider {
                    provider: binding.provider.as_str().to_string(),
                    detail,
                });
            }
        };

        let decomposed = decompose(&raw);
        let validation = self.validator.validate(&decomposed.code_body, request.target);
        let report = AttemptReport {
            kind,
            feedback: decomposed.feedback_lines,
            code: decomposed.code_body,
            validation,
        };
        self.record(
            "attempt_finished",
            json!({
                "attempt": number,
                "kind": kind,
                "code_chars": report.code.chars().count(),
                "feedback_lines": report.feedback.len(),
                "valid": report.validation.is_ok(),
                "violations": report.validation.violations(),
            }),
        );
        Ok(report)
    }

    fn record(&self, event_type: &str, payload: Value) {
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = self.events.emit(event_type, payload) {
            tracing::warn!(event = event_type, "event log write failed: {err:#}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use mcai_contracts::events::EventWriter;
    use mcai_contracts::presets::ProviderBinding;
    use mcai_contracts::prompts::{PromptPair, EMPTY_CODE_CORRECTION};
    use mcai_contracts::request::GenerationRequest;
    use mcai_contracts::targets::{Target, TARGETS};
    use mcai_contracts::validation::{PatternValidator, ValidationResult};
    use mcai_contracts::McaiError;
    use serde_json::Value;

    use super::*;

    /// Replays canned replies in order and records every prompt it was sent.
    pub(crate) struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) seen: Mutex<Vec<PromptPair>>,
    }

    impl ScriptedGateway {
        pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn prompts(&self) -> Vec<PromptPair> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl CompletionGateway for ScriptedGateway {
        fn complete(&self, _binding: &ProviderBinding, prompt: &PromptPair) -> Result<String> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(prompt.clone());
            }
            let next = self
                .replies
                .lock()
                .map_err(|_| anyhow!("script lock poisoned"))?
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()));
            next.map_err(|message| anyhow!(message))
        }
    }

    fn request(target: Target) -> GenerationRequest {
        GenerationRequest {
            target,
            request_text: "flash the LED on button press".to_string(),
            current_code: None,
        }
    }

    fn run(gateway: &ScriptedGateway, target: Target) -> Result<GenerationOutcome, McaiError> {
        Orchestrator::new(gateway, &PatternValidator, EventWriter::disabled())
            .run(&ProviderBinding::auto_routed(), &request(target))
    }

    fn report(kind: AttemptKind, code: &str, violations: &[&str]) -> AttemptReport {
        AttemptReport {
            kind,
            feedback: Vec::new(),
            code: code.to_string(),
            validation: ValidationResult::from_violations(violations.iter().copied()),
        }
    }

    #[test]
    fn transition_table() {
        use AttemptKind::*;
        assert_eq!(next_attempt(&report(Initial, " \n", &[])), Some(EmptyCodeCorrection));
        assert_eq!(next_attempt(&report(Initial, "x", &["timers"])), Some(ViolationCorrection));
        assert_eq!(next_attempt(&report(Initial, "x", &[])), None);
        assert_eq!(
            next_attempt(&report(EmptyCodeCorrection, "x", &["timers"])),
            Some(ViolationCorrection)
        );
        assert_eq!(next_attempt(&report(EmptyCodeCorrection, "", &[])), None);
        assert_eq!(next_attempt(&report(EmptyCodeCorrection, "x", &[])), None);
        assert_eq!(next_attempt(&report(ViolationCorrection, "x", &["timers"])), None);
        assert_eq!(next_attempt(&report(ViolationCorrection, "", &[])), None);
    }

    #[test]
    fn corrective_notes_follow_kind() {
        let previous = report(AttemptKind::Initial, "x", &["arrow functions", "timers"]);
        assert_eq!(AttemptKind::Initial.corrective_note(Some(&previous)), None);
        assert_eq!(
            AttemptKind::EmptyCodeCorrection.corrective_note(None).as_deref(),
            Some(EMPTY_CODE_CORRECTION)
        );
        let note = AttemptKind::ViolationCorrection
            .corrective_note(Some(&previous))
            .unwrap_or_default();
        assert!(note.starts_with("Previous code used: arrow functions, timers."));
    }

    #[test]
    fn clean_first_reply_is_returned_as_is() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("basic.onStart(function () {\n})")]);
        let outcome = run(&gateway, Target::Microbit)?;
        assert_eq!(outcome.code, "basic.onStart(function () {\n})");
        assert!(outcome.feedback.is_empty());
        assert_eq!(gateway.prompts().len(), 1);
        Ok(())
    }

    #[test]
    fn violations_trigger_one_listing_correction() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![
            Ok("```ts\ncontroller.A.onEvent(ControllerButtonEvent.Pressed, () => {\n})\n```"),
            Ok("FEEDBACK: Replaced the arrow function.\ncontroller.A.onEvent(ControllerButtonEvent.Pressed, function () {\n})"),
        ]);
        let outcome = run(&gateway, Target::Arcade)?;

        assert_eq!(
            outcome.code,
            "controller.A.onEvent(ControllerButtonEvent.Pressed, function () {\n})"
        );
        assert_eq!(outcome.feedback, vec!["Replaced the arrow function."]);
        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 2);
        let last_line = prompts[1].system_text.lines().last().unwrap_or_default();
        assert!(last_line.starts_with("Previous code used: arrow functions."));
        assert!(!prompts[0].system_text.contains("Previous code used"));
        assert_eq!(prompts[0].user_text, prompts[1].user_text);
        Ok(())
    }

    #[test]
    fn empty_reply_takes_the_empty_code_branch() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok(""), Ok("loops.forever(function () {\n})")]);
        let outcome = run(&gateway, Target::Maker)?;
        assert_eq!(outcome.code, "loops.forever(function () {\n})");
        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].system_text.ends_with(EMPTY_CODE_CORRECTION));
        Ok(())
    }

    #[test]
    fn empty_then_invalid_uses_all_three_attempts() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![
            Ok("FEEDBACK: thinking"),
            Ok("console.log(1)"),
            Ok("FEEDBACK: still bad\nconsole.log(2)"),
        ]);
        let outcome = run(&gateway, Target::Microbit)?;
        assert_eq!(gateway.prompts().len(), 3);
        assert_eq!(outcome.code, "console.log(2)");
        assert_eq!(outcome.feedback, vec!["still bad"]);
        Ok(())
    }

    #[test]
    fn blank_after_every_attempt_falls_back_with_last_feedback() -> anyhow::Result<()> {
        for target in TARGETS {
            let gateway = ScriptedGateway::new(vec![
                Ok("FEEDBACK: first"),
                Ok("FEEDBACK: second\n```\n```"),
            ]);
            let outcome = run(&gateway, *target)?;
            assert_eq!(outcome.code, target.fallback_stub());
            assert_eq!(outcome.feedback, vec!["second"]);
            assert_eq!(gateway.prompts().len(), 2);
        }
        Ok(())
    }

    #[test]
    fn invalid_then_blank_falls_back() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("let f = () => 1"), Ok("   ")]);
        let outcome = run(&gateway, Target::Arcade)?;
        assert_eq!(outcome.code, Target::Arcade.fallback_stub());
        assert!(outcome.feedback.is_empty());
        Ok(())
    }

    #[test]
    fn still_invalid_after_correction_is_returned_best_effort() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("let f = () => 1"), Ok("let g = () => 2")]);
        let outcome = run(&gateway, Target::Maker)?;
        assert_eq!(outcome.code, "let g = () => 2");
        assert_eq!(gateway.prompts().len(), 2);
        Ok(())
    }

    #[test]
    fn provider_failure_aborts_without_fallback() {
        let gateway = ScriptedGateway::new(vec![Err("OPENROUTER_API_KEY missing")]);
        let err = run(&gateway, Target::Microbit).err();
        assert!(matches!(
            err,
            Some(McaiError::Provider { ref provider, ref detail })
                if provider == "openrouter" && detail == "OPENROUTER_API_KEY missing"
        ));
        assert_eq!(gateway.prompts().len(), 1);
    }

    #[test]
    fn provider_failure_on_a_correction_also_aborts() {
        let gateway = ScriptedGateway::new(vec![Ok(""), Err("upstream 503")]);
        assert!(matches!(
            run(&gateway, Target::Maker),
            Err(McaiError::Provider { .. })
        ));
    }

    #[test]
    fn never_returns_empty_code() -> anyhow::Result<()> {
        let first = ["", "basic.pause(1)", "let f = () => 1"];
        let later = ["", "basic.pause(2)", "console.log(1)"];
        for target in TARGETS {
            for a in first {
                for b in later {
                    for c in later {
                        let gateway = ScriptedGateway::new(vec![Ok(a), Ok(b), Ok(c)]);
                        let outcome = run(&gateway, *target)?;
                        assert!(!outcome.code.trim().is_empty());
                        assert!(gateway.prompts().len() <= MAX_ATTEMPTS);
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn attempts_are_logged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let gateway = ScriptedGateway::new(vec![Ok(""), Ok("")]);
        let events = EventWriter::new(&path).for_request("req-9");
        Orchestrator::new(&gateway, &PatternValidator, events)
            .run(&ProviderBinding::auto_routed(), &request(Target::Maker))?;

        let rows: Vec<Value> = std::fs::read_to_string(&path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let kinds: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str))
            .collect();
        assert_eq!(kinds, vec!["attempt_finished", "attempt_finished", "fallback_used"]);
        assert_eq!(rows[1]["kind"], Value::String("empty_code_correction".to_string()));
        assert!(rows.iter().all(|row| row["request_id"] == "req-9"));
        Ok(())
    }
}
