//! Clinical assistant transcript.
//!
//! Two sources feed one append-only transcript: a single automatic insight
//! fetch for the admitted patient, and free-form questions. The automatic
//! fetch is latched (NotFetched → Fetching → Fetched) so re-activating the
//! session never issues it twice.

use serde::Serialize;

use crate::api::ClinicalApi;
use crate::models::{Message, MessageKind};
use crate::readiness::InsightPass;

const INSIGHT_FAILED: &str = "Failed to fetch insight.";
const ASK_FAILED: &str = "Failed to get response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    NotFetched,
    Fetching,
    Fetched,
}

pub struct InsightSession<'a> {
    api: &'a dyn ClinicalApi,
    patient_id: Option<String>,
    fetch: FetchState,
    transcript: Vec<Message>,
}

impl<'a> InsightSession<'a> {
    /// Session for a patient that passed the readiness gate.
    pub fn for_patient(api: &'a dyn ClinicalApi, pass: InsightPass) -> Self {
        Self {
            api,
            patient_id: Some(pass.patient_id().to_string()),
            fetch: FetchState::NotFetched,
            transcript: Vec::new(),
        }
    }

    /// Session with no patient: questions only, no automatic insight.
    pub fn general(api: &'a dyn ClinicalApi) -> Self {
        Self {
            api,
            patient_id: None,
            fetch: FetchState::NotFetched,
            transcript: Vec::new(),
        }
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    pub fn fetch_state(&self) -> FetchState {
        self.fetch
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Run the automatic insight fetch if it has not run in this session.
    ///
    /// Safe to call on every re-evaluation of the activating condition.
    /// Returns whether a request was issued.
    pub fn activate(&mut self) -> bool {
        let Some(patient_id) = self.patient_id.as_deref() else {
            return false;
        };
        if self.fetch != FetchState::NotFetched {
            return false;
        }
        self.fetch = FetchState::Fetching;

        let api = self.api;
        let messages = match api.clinical_insight(patient_id) {
            Ok(insight) => match insight.error {
                Some(error) => {
                    tracing::warn!(patient_id, error = %error, "Clinical insight returned an error");
                    vec![Message::assistant(MessageKind::Error, format!("Error: {error}"))]
                }
                None => {
                    tracing::info!(patient_id, "Clinical insight received");
                    let mut messages = vec![
                        Message::assistant(
                            MessageKind::Summary,
                            format!("Patient Summary:\n{}", insight.summary.unwrap_or_default()),
                        ),
                        Message::assistant(MessageKind::Answer, insight.answer.unwrap_or_default()),
                    ];
                    messages.extend(sources_message(insight.source.as_deref()));
                    messages
                }
            },
            Err(e) => {
                tracing::warn!(patient_id, error = %e, "Clinical insight request failed");
                vec![Message::assistant(MessageKind::Error, INSIGHT_FAILED)]
            }
        };

        self.transcript.extend(messages);
        self.fetch = FetchState::Fetched;
        true
    }

    /// Ask a free-form question. Blank input does nothing.
    ///
    /// Returns whether a request was issued.
    pub fn ask(&mut self, text: &str) -> bool {
        let question = text.trim();
        if question.is_empty() {
            return false;
        }
        self.transcript.push(Message::user(question));

        match self.api.ask(question) {
            Ok(reply) => match (reply.error, reply.answer) {
                (Some(error), _) => {
                    tracing::warn!(error = %error, "Assistant returned an error");
                    self.transcript
                        .push(Message::assistant(MessageKind::Error, format!("Error: {error}")));
                }
                (None, Some(answer)) => {
                    self.transcript.push(Message::assistant(MessageKind::Reply, answer));
                    self.transcript.extend(sources_message(reply.source.as_deref()));
                }
                (None, None) => {
                    tracing::warn!("Assistant reply carried no answer");
                    self.transcript.push(Message::assistant(MessageKind::Error, ASK_FAILED));
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Assistant request failed");
                self.transcript.push(Message::assistant(MessageKind::Error, ASK_FAILED));
            }
        }
        true
    }
}

/// One bulleted sources message, or nothing when there are no sources.
fn sources_message(sources: Option<&[String]>) -> Option<Message> {
    let sources = sources.filter(|s| !s.is_empty())?;
    let list = sources
        .iter()
        .map(|s| format!("• {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(Message::assistant(MessageKind::Sources, format!("Sources:\n{list}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, AskResponse, Endpoint, InsightResponse, MockClinicalApi};
    use crate::models::{ScanLabel, Sender};
    use crate::readiness::ReadinessGate;

    fn admitted(api: &MockClinicalApi, patient_id: &str) -> InsightPass {
        ReadinessGate::new(api).admit(patient_id).unwrap()
    }

    fn ready_api(patient_id: &str) -> MockClinicalApi {
        MockClinicalApi::new()
            .with_saved_symptoms(patient_id)
            .with_saved_scan(patient_id, ScanLabel::Ischemic)
    }

    fn kinds(session: &InsightSession<'_>) -> Vec<MessageKind> {
        session.transcript().iter().map(|m| m.kind).collect()
    }

    #[test]
    fn insight_appends_summary_answer_sources_in_order() {
        let api = ready_api("5").with_insight(InsightResponse {
            summary: Some("S".into()),
            answer: Some("A".into()),
            source: Some(vec!["doc1".into()]),
            error: None,
        });
        let pass = admitted(&api, "5");
        let mut session = InsightSession::for_patient(&api, pass);

        assert!(session.activate());
        assert_eq!(
            kinds(&session),
            vec![MessageKind::Summary, MessageKind::Answer, MessageKind::Sources]
        );
        let texts: Vec<_> = session.transcript().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Patient Summary:\nS", "A", "Sources:\n• doc1"]);
        assert!(session.transcript().iter().all(|m| m.sender == Sender::Assistant));
    }

    #[test]
    fn insight_fetch_fires_once_per_session() {
        let api = ready_api("5");
        let pass = admitted(&api, "5");
        let mut session = InsightSession::for_patient(&api, pass);

        assert!(session.activate());
        assert!(!session.activate());
        assert!(!session.activate());
        assert_eq!(session.fetch_state(), FetchState::Fetched);
        assert_eq!(api.calls(Endpoint::ClinicalInsight), 1);
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn insight_without_sources_has_two_messages() {
        let api = ready_api("5").with_insight(InsightResponse {
            summary: Some("S".into()),
            answer: Some("A".into()),
            source: Some(Vec::new()),
            error: None,
        });
        let pass = admitted(&api, "5");
        let mut session = InsightSession::for_patient(&api, pass);
        session.activate();
        assert_eq!(kinds(&session), vec![MessageKind::Summary, MessageKind::Answer]);
    }

    #[test]
    fn insight_failure_appends_one_error_without_retry() {
        let api = ready_api("5");
        let pass = admitted(&api, "5");
        api.fail(Endpoint::ClinicalInsight, ApiError::Timeout(30));
        let mut session = InsightSession::for_patient(&api, pass);

        assert!(session.activate());
        assert!(!session.activate());
        assert_eq!(kinds(&session), vec![MessageKind::Error]);
        assert_eq!(session.transcript()[0].text, "Failed to fetch insight.");
        assert_eq!(api.calls(Endpoint::ClinicalInsight), 1);
    }

    #[test]
    fn insight_error_field_is_one_error_message() {
        let api = ready_api("5").with_insight(InsightResponse {
            error: Some("Patient data not found.".into()),
            ..InsightResponse::default()
        });
        let pass = admitted(&api, "5");
        let mut session = InsightSession::for_patient(&api, pass);
        session.activate();
        assert_eq!(kinds(&session), vec![MessageKind::Error]);
        assert_eq!(session.transcript()[0].text, "Error: Patient data not found.");
    }

    #[test]
    fn general_session_never_fetches_insight() {
        let api = MockClinicalApi::new();
        let mut session = InsightSession::general(&api);
        assert!(!session.activate());
        assert_eq!(session.fetch_state(), FetchState::NotFetched);
        assert_eq!(api.total_calls(), 0);
    }

    #[test]
    fn blank_question_is_a_no_op() {
        let api = MockClinicalApi::new();
        let mut session = InsightSession::general(&api);
        assert!(!session.ask(""));
        assert!(!session.ask(" \t\n "));
        assert!(session.transcript().is_empty());
        assert_eq!(api.calls(Endpoint::Ask), 0);
    }

    #[test]
    fn question_then_reply_with_sources() {
        let api = MockClinicalApi::new().with_answer(AskResponse {
            answer: Some("Give tPA within 4.5 hours.".into()),
            source: Some(vec!["AHA 2019".into(), "NICE NG128".into()]),
            error: None,
        });
        let mut session = InsightSession::general(&api);

        assert!(session.ask("  When is thrombolysis indicated?  "));
        assert_eq!(
            kinds(&session),
            vec![MessageKind::Question, MessageKind::Reply, MessageKind::Sources]
        );
        let transcript = session.transcript();
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[0].text, "When is thrombolysis indicated?");
        assert_eq!(transcript[2].text, "Sources:\n• AHA 2019\n• NICE NG128");
    }

    #[test]
    fn failed_question_keeps_user_message() {
        let api = MockClinicalApi::new();
        api.fail(Endpoint::Ask, ApiError::Connection("mock".into()));
        let mut session = InsightSession::general(&api);

        assert!(session.ask("Dosage?"));
        assert_eq!(kinds(&session), vec![MessageKind::Question, MessageKind::Error]);
        assert_eq!(session.transcript()[1].text, "Failed to get response.");
    }

    #[test]
    fn error_reply_is_an_error_message() {
        let api = MockClinicalApi::new().with_answer(AskResponse {
            answer: None,
            source: None,
            error: Some("Knowledge base unavailable".into()),
        });
        let mut session = InsightSession::general(&api);
        session.ask("Dosage?");
        assert_eq!(session.transcript()[1].text, "Error: Knowledge base unavailable");
    }

    #[test]
    fn manual_and_automatic_messages_interleave_by_append_order() {
        let api = ready_api("5");
        let pass = admitted(&api, "5");
        let mut session = InsightSession::for_patient(&api, pass);

        session.ask("Is she eligible for thrombectomy?");
        session.activate();
        assert_eq!(
            kinds(&session),
            vec![
                MessageKind::Question,
                MessageKind::Reply,
                MessageKind::Summary,
                MessageKind::Answer
            ]
        );
    }
}
