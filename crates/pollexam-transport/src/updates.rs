//! Inbound Telegram updates and chat command parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use pollexam_core::model::{GroupId, Participant, PresetOverride, Question};
use pollexam_core::session::AnswerEvent;

use crate::error::CommandError;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub poll_answer: Option<PollAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    pub fn to_participant(&self) -> Participant {
        let full_name = match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        };
        let participant = Participant::new(self.id, full_name);
        match &self.username {
            Some(handle) if !handle.is_empty() => participant.with_username(handle.clone()),
            _ => participant,
        }
    }
}

/// A poll sent to the bot, as opposed to one it sent.
#[derive(Debug, Clone, Deserialize)]
pub struct Poll {
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOptionText>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub correct_option_id: Option<usize>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollOptionText {
    pub text: String,
}

impl Poll {
    /// A bank question, if this is a quiz poll with a known answer.
    pub fn into_question(self) -> Result<Question, CommandError> {
        let correct = match (self.kind.as_str(), self.correct_option_id) {
            ("quiz", Some(correct)) => correct,
            _ => return Err(CommandError::NotAQuiz),
        };
        let options = self.options.into_iter().map(|o| o.text).collect();
        let question = Question::new(self.question.trim(), options, correct)
            .map_err(|e| CommandError::InvalidQuestion(e.to_string()))?;
        Ok(match self.explanation.filter(|e| !e.trim().is_empty()) {
            Some(explanation) => question.with_explanation(explanation),
            None => question,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub option_ids: Vec<usize>,
}

/// A chat command the bot acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    /// `/start_exam ["Name" [secs [mark [penalty]]]]`
    StartExam(Option<PresetOverride>),
    /// `/stop_exam`
    StopExam,
    /// `/schedule_exam <instant>`
    ScheduleExam(DateTime<Utc>),
    /// `/cancel_schedule`
    CancelSchedule,
    /// `/join`: take part without answering yet.
    Join,
    /// `/question_count`
    QuestionCount,
}

/// A command together with where it came from.
#[derive(Debug, Clone)]
pub struct CommandMessage {
    pub chat_id: GroupId,
    pub chat_username: Option<String>,
    pub from: Participant,
    /// Sent in a private chat with the bot rather than a group.
    pub private: bool,
    pub command: Result<BotCommand, CommandError>,
}

/// What an update means to the bot.
#[derive(Debug, Clone)]
pub enum BotEvent {
    Answer(AnswerEvent),
    Command(CommandMessage),
    /// A poll sent to the bot in a private chat.
    ImportPoll {
        from: Participant,
        question: Result<Question, CommandError>,
    },
    /// A `.json` file sent to the bot in a private chat.
    ImportDocument {
        from: Participant,
        file_id: String,
        file_name: String,
    },
}

impl Update {
    /// Interpret the update, or `None` if the bot does not care about it.
    pub fn into_event(self) -> Option<BotEvent> {
        if let Some(answer) = self.poll_answer {
            // Anonymous votes cannot be attributed.
            let user = answer.user?;
            return Some(BotEvent::Answer(AnswerEvent {
                poll_id: answer.poll_id,
                participant: user.to_participant(),
                choice: answer.option_ids.first().copied(),
            }));
        }

        let message = self.message?;
        if message.chat.kind == "private" {
            return message.into_private_event();
        }
        let from = message.from?;
        let command = parse_command(message.text.as_deref()?)?;
        Some(BotEvent::Command(CommandMessage {
            chat_id: message.chat.id,
            chat_username: message.chat.username,
            from: from.to_participant(),
            private: false,
            command,
        }))
    }
}

impl Message {
    /// Private chats feed the question bank. Of the commands only
    /// `/question_count` applies there.
    fn into_private_event(self) -> Option<BotEvent> {
        let from = self.from?.to_participant();
        if let Some(poll) = self.poll {
            return Some(BotEvent::ImportPoll {
                from,
                question: poll.into_question(),
            });
        }
        if let Some(document) = self.document {
            let file_name = document
                .file_name
                .filter(|name| name.to_lowercase().ends_with(".json"))?;
            return Some(BotEvent::ImportDocument {
                from,
                file_id: document.file_id,
                file_name,
            });
        }
        match parse_command(self.text.as_deref()?)? {
            Ok(BotCommand::QuestionCount) => Some(BotEvent::Command(CommandMessage {
                chat_id: self.chat.id,
                chat_username: None,
                from,
                private: true,
                command: Ok(BotCommand::QuestionCount),
            })),
            _ => None,
        }
    }
}

/// Parse a slash command. Returns `None` for text the bot does not handle.
pub fn parse_command(text: &str) -> Option<Result<BotCommand, CommandError>> {
    let text = text.trim();
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    // `/cmd@botname` in groups.
    let name = head.strip_prefix('/')?.split('@').next()?;
    let rest = rest.trim();

    let command = match name {
        "start_exam" => parse_start_args(rest).map(BotCommand::StartExam),
        "stop_exam" => Ok(BotCommand::StopExam),
        "schedule_exam" => parse_instant(rest).map(BotCommand::ScheduleExam),
        "cancel_schedule" => Ok(BotCommand::CancelSchedule),
        "join" => Ok(BotCommand::Join),
        "question_count" => Ok(BotCommand::QuestionCount),
        _ => return None,
    };
    Some(command)
}

fn parse_start_args(rest: &str) -> Result<Option<PresetOverride>, CommandError> {
    let args = split_args(rest)?;
    if args.is_empty() {
        return Ok(None);
    }
    let mut args = args.into_iter();
    let exam_name = args.next();
    let time_per_question = args
        .next()
        .map(|v| {
            v.parse::<u32>().map_err(|_| CommandError::InvalidNumber {
                field: "time per question",
                value: v,
            })
        })
        .transpose()?;
    let mut number = |field: &'static str| {
        args.next()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| CommandError::InvalidNumber { field, value: v })
            })
            .transpose()
    };
    let mark_per_correct = number("mark")?;
    let penalty_per_wrong = number("penalty")?;

    Ok(Some(PresetOverride {
        exam_name,
        time_per_question,
        mark_per_correct,
        penalty_per_wrong,
    }))
}

/// Split on whitespace, keeping `"double quoted"` runs together.
fn split_args(rest: &str) -> Result<Vec<String>, CommandError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_token = false;

    for c in rest.chars() {
        match c {
            '"' | '“' | '”' => {
                quoted = !quoted;
                has_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if quoted {
        return Err(CommandError::UnterminatedQuote);
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

/// RFC 3339, or `YYYY-MM-DD HH:MM` taken as UTC.
fn parse_instant(rest: &str) -> Result<DateTime<Utc>, CommandError> {
    let raw = rest.trim().trim_matches('"');
    if raw.is_empty() {
        return Err(CommandError::MissingArgument("start time"));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .map(|naive| naive.and_utc())
        .map_err(|_| CommandError::InvalidTime(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_exam_with_override() {
        let cmd = parse_command(r#"/start_exam "English Model Test" 30 1 0.25"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            BotCommand::StartExam(Some(PresetOverride {
                exam_name: Some("English Model Test".into()),
                time_per_question: Some(30),
                mark_per_correct: Some(1.0),
                penalty_per_wrong: Some(0.25),
            }))
        );
    }

    #[test]
    fn start_exam_bare_and_partial() {
        assert_eq!(
            parse_command("/start_exam@pollexam_bot").unwrap().unwrap(),
            BotCommand::StartExam(None)
        );
        let BotCommand::StartExam(Some(ov)) =
            parse_command("/start_exam Physics 45").unwrap().unwrap()
        else {
            panic!("expected override");
        };
        assert_eq!(ov.exam_name.as_deref(), Some("Physics"));
        assert_eq!(ov.time_per_question, Some(45));
        assert_eq!(ov.mark_per_correct, None);
    }

    #[test]
    fn start_exam_bad_numbers() {
        assert_eq!(
            parse_command("/start_exam Quiz thirty").unwrap(),
            Err(CommandError::InvalidNumber {
                field: "time per question",
                value: "thirty".into()
            })
        );
        assert_eq!(
            parse_command(r#"/start_exam "Quiz"#).unwrap(),
            Err(CommandError::UnterminatedQuote)
        );
    }

    #[test]
    fn schedule_exam_instants() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 20, 10, 0, 0).unwrap();
        assert_eq!(
            parse_command("/schedule_exam 2026-10-20T10:00:00Z").unwrap(),
            Ok(BotCommand::ScheduleExam(expected))
        );
        assert_eq!(
            parse_command("/schedule_exam 2026-10-20 10:00").unwrap(),
            Ok(BotCommand::ScheduleExam(expected))
        );
        assert_eq!(
            parse_command("/schedule_exam 2026-10-20T16:00:00+06:00").unwrap(),
            Ok(BotCommand::ScheduleExam(expected))
        );
        assert!(matches!(
            parse_command("/schedule_exam tomorrow").unwrap(),
            Err(CommandError::InvalidTime(_))
        ));
        assert_eq!(
            parse_command("/schedule_exam").unwrap(),
            Err(CommandError::MissingArgument("start time"))
        );
    }

    #[test]
    fn other_text_is_ignored() {
        assert!(parse_command("hello everyone").is_none());
        assert!(parse_command("/unknown_cmd").is_none());
        assert_eq!(
            parse_command("/stop_exam").unwrap(),
            Ok(BotCommand::StopExam)
        );
    }

    #[test]
    fn poll_answer_becomes_answer_event() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 10,
                "poll_answer": {
                    "poll_id": "5012345",
                    "user": {"id": 77, "first_name": "Ada", "last_name": "Lovelace", "username": "ada"},
                    "option_ids": [2]
                }
            }"#,
        )
        .unwrap();
        let Some(BotEvent::Answer(event)) = update.into_event() else {
            panic!("expected answer");
        };
        assert_eq!(event.poll_id, "5012345");
        assert_eq!(event.choice, Some(2));
        assert_eq!(event.participant.display_name(), "Ada Lovelace (@ada)");
    }

    #[test]
    fn retracted_vote_has_no_choice() {
        let update: Update = serde_json::from_str(
            r#"{"update_id": 11, "poll_answer": {"poll_id": "p", "user": {"id": 1, "first_name": "B"}, "option_ids": []}}"#,
        )
        .unwrap();
        let Some(BotEvent::Answer(event)) = update.into_event() else {
            panic!("expected answer");
        };
        assert_eq!(event.choice, None);
    }

    #[test]
    fn group_command_message() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 12,
                "message": {
                    "message_id": 3,
                    "chat": {"id": -1001234, "type": "supergroup", "username": "physics_club"},
                    "from": {"id": 5, "first_name": "Admin"},
                    "text": "/stop_exam"
                }
            }"#,
        )
        .unwrap();
        let Some(BotEvent::Command(cmd)) = update.into_event() else {
            panic!("expected command");
        };
        assert_eq!(cmd.chat_id, -1001234);
        assert_eq!(cmd.chat_username.as_deref(), Some("physics_club"));
        assert_eq!(cmd.from.id, 5);
        assert!(!cmd.private);
        assert_eq!(cmd.command, Ok(BotCommand::StopExam));
    }

    #[test]
    fn private_chatter_is_ignored() {
        let update: Update = serde_json::from_str(
            r#"{"update_id": 13, "message": {"message_id": 1, "chat": {"id": 5, "type": "private"}, "from": {"id": 5, "first_name": "A"}, "text": "/start_exam"}}"#,
        )
        .unwrap();
        assert!(update.into_event().is_none());
    }

    fn private_message(body: &str) -> Update {
        serde_json::from_str(&format!(
            r#"{{"update_id": 20, "message": {{"message_id": 4, "chat": {{"id": 9, "type": "private"}}, "from": {{"id": 9, "first_name": "Admin"}}, {body}}}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn private_quiz_poll_becomes_a_question() {
        let update = private_message(
            r#""poll": {
                "id": "p1",
                "question": " Capital of Bangladesh? ",
                "options": [{"text": "Dhaka", "voter_count": 0}, {"text": "Khulna", "voter_count": 0}],
                "type": "quiz",
                "correct_option_id": 0,
                "explanation": "Since 1971."
            }"#,
        );
        let Some(BotEvent::ImportPoll { from, question }) = update.into_event() else {
            panic!("expected poll import");
        };
        assert_eq!(from.id, 9);
        let question = question.unwrap();
        assert_eq!(question.text, "Capital of Bangladesh?");
        assert_eq!(question.options, vec!["Dhaka", "Khulna"]);
        assert_eq!(question.correct, 0);
        assert_eq!(question.explanation.as_deref(), Some("Since 1971."));
    }

    #[test]
    fn regular_or_answerless_polls_are_refused() {
        let regular = private_message(
            r#""poll": {"id": "p2", "question": "Lunch?", "options": [{"text": "Yes"}, {"text": "No"}], "type": "regular"}"#,
        );
        let Some(BotEvent::ImportPoll { question, .. }) = regular.into_event() else {
            panic!("expected poll import");
        };
        assert_eq!(question, Err(CommandError::NotAQuiz));

        let hidden = private_message(
            r#""poll": {"id": "p3", "question": "2 + 2?", "options": [{"text": "4"}, {"text": "5"}], "type": "quiz"}"#,
        );
        let Some(BotEvent::ImportPoll { question, .. }) = hidden.into_event() else {
            panic!("expected poll import");
        };
        assert_eq!(question, Err(CommandError::NotAQuiz));

        let single = private_message(
            r#""poll": {"id": "p4", "question": "Only one?", "options": [{"text": "Yes"}], "type": "quiz", "correct_option_id": 0}"#,
        );
        let Some(BotEvent::ImportPoll { question, .. }) = single.into_event() else {
            panic!("expected poll import");
        };
        assert!(matches!(question, Err(CommandError::InvalidQuestion(_))));
    }

    #[test]
    fn private_json_documents_only() {
        let json = private_message(
            r#""document": {"file_id": "F1", "file_name": "Chapter-3.JSON"}"#,
        );
        let Some(BotEvent::ImportDocument { file_id, file_name, .. }) = json.into_event() else {
            panic!("expected document import");
        };
        assert_eq!(file_id, "F1");
        assert_eq!(file_name, "Chapter-3.JSON");

        let pdf = private_message(r#""document": {"file_id": "F2", "file_name": "notes.pdf"}"#);
        assert!(pdf.into_event().is_none());
    }

    #[test]
    fn question_count_in_private_and_group() {
        let Some(BotEvent::Command(cmd)) =
            private_message(r#""text": "/question_count""#).into_event()
        else {
            panic!("expected command");
        };
        assert!(cmd.private);
        assert_eq!(cmd.chat_id, 9);
        assert_eq!(cmd.command, Ok(BotCommand::QuestionCount));

        assert_eq!(
            parse_command("/question_count@pollexam_bot").unwrap(),
            Ok(BotCommand::QuestionCount)
        );
    }
}
