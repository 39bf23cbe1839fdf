//! The live exam session aggregate and answer correlation.
//!
//! Only the dispatch task advances `current_index` and appends to the poll
//! map. Answer recording may run on any thread; the answered-set check and
//! insert happen under the session's answer-book mutex.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::model::{GroupId, Outcome, Participant, Preset, Question, UserId, UserResult};
use crate::report::ExamSummary;
use crate::scoring::{apply_answer, settle};
use crate::traits::{MessageId, PollId, PresentedQuestion};

/// An inbound poll answer, stripped of transport specifics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub poll_id: PollId,
    pub participant: Participant,
    /// Chosen option index; `None` for an empty or withdrawn vote.
    pub choice: Option<usize>,
}

impl AnswerEvent {
    pub fn chose(poll_id: impl Into<PollId>, participant: Participant, option: usize) -> Self {
        Self {
            poll_id: poll_id.into(),
            participant,
            choice: Some(option),
        }
    }

    pub fn empty(poll_id: impl Into<PollId>, participant: Participant) -> Self {
        Self {
            poll_id: poll_id.into(),
            participant,
            choice: None,
        }
    }
}

/// What happened to a recorded answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First answer for the question; scored.
    Scored(Outcome),
    /// First answer for the question, but no option chosen. The slot is taken
    /// and the question will count as skipped.
    NoChoice,
    /// The participant already answered this question.
    Duplicate,
    /// The poll is not part of any live session.
    UnknownPoll,
    /// The session is already being finalized.
    Closed,
}

#[derive(Default)]
struct AnswerBook {
    answered: HashMap<usize, HashSet<UserId>>,
    /// Results in first-seen order.
    results: Vec<UserResult>,
    positions: HashMap<UserId, usize>,
}

impl AnswerBook {
    fn result_mut(&mut self, participant: Participant) -> &mut UserResult {
        let position = match self.positions.get(&participant.id) {
            Some(&p) => p,
            None => {
                let p = self.results.len();
                self.positions.insert(participant.id, p);
                self.results.push(UserResult::new(participant));
                p
            }
        };
        &mut self.results[position]
    }
}

/// One timed run of a question sequence in one group.
pub struct ExamSession {
    id: Uuid,
    group: GroupId,
    exam_name: String,
    questions: Vec<Question>,
    time_per_question: u32,
    mark_per_correct: f64,
    penalty_per_wrong: f64,
    started_at: Instant,
    active: AtomicBool,
    finished: AtomicBool,
    current_index: AtomicUsize,
    presented: AtomicUsize,
    polls: RwLock<HashMap<PollId, usize>>,
    messages: RwLock<BTreeMap<usize, MessageId>>,
    book: Mutex<AnswerBook>,
    stop: watch::Sender<bool>,
}

impl ExamSession {
    /// Create an active session from a preset and a bank snapshot.
    pub fn new(group: GroupId, preset: &Preset, questions: Vec<Question>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            group,
            exam_name: preset.exam_name.clone(),
            questions,
            time_per_question: preset.time_per_question,
            mark_per_correct: preset.mark_per_correct,
            penalty_per_wrong: preset.penalty_per_wrong,
            started_at: Instant::now(),
            active: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            current_index: AtomicUsize::new(0),
            presented: AtomicUsize::new(0),
            polls: RwLock::new(HashMap::new()),
            messages: RwLock::new(BTreeMap::new()),
            book: Mutex::new(AnswerBook::default()),
            stop,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn time_per_question(&self) -> u32 {
        self.time_per_question
    }

    pub fn summary(&self) -> ExamSummary {
        ExamSummary {
            session_id: self.id,
            group: self.group,
            exam_name: self.exam_name.clone(),
            total_questions: self.questions.len(),
            time_per_question: self.time_per_question,
            mark_per_correct: self.mark_per_correct,
            penalty_per_wrong: self.penalty_per_wrong,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Mark the session inactive. Returns `true` if it was active before.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Deactivate and wake the dispatch task out of its current wait.
    pub fn request_stop(&self) -> bool {
        let was_active = self.deactivate();
        self.stop.send_replace(true);
        was_active
    }

    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    /// Claim finalization. Only the first caller gets `true`.
    pub fn try_finish(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn current_index(&self) -> usize {
        self.current_index.load(Ordering::Acquire)
    }

    pub(crate) fn set_current_index(&self, index: usize) {
        self.current_index.store(index, Ordering::Release);
    }

    /// Number of questions that reached the group.
    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::Acquire)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Remember a presented question's poll and open its answer slot.
    pub(crate) fn begin_question(&self, index: usize, presented: &PresentedQuestion) {
        write(&self.polls).insert(presented.poll_id.clone(), index);
        if let Some(message) = presented.message_id {
            write(&self.messages).insert(index, message);
        }
        lock(&self.book).answered.entry(index).or_default();
        self.presented.fetch_max(index + 1, Ordering::AcqRel);
    }

    pub fn question_for_poll(&self, poll_id: &str) -> Option<usize> {
        read(&self.polls).get(poll_id).copied()
    }

    pub fn question_messages(&self) -> BTreeMap<usize, MessageId> {
        read(&self.messages).clone()
    }

    /// Record a participant's answer to question `index`.
    ///
    /// The first answer per participant and question wins; replays and
    /// answers arriving once finalization has begun are discarded.
    pub fn record(
        &self,
        index: usize,
        participant: Participant,
        choice: Option<usize>,
    ) -> RecordOutcome {
        let Some(question) = self.questions.get(index) else {
            return RecordOutcome::UnknownPoll;
        };
        let mut book = lock(&self.book);
        if self.is_finished() {
            return RecordOutcome::Closed;
        }
        if !book.answered.entry(index).or_default().insert(participant.id) {
            return RecordOutcome::Duplicate;
        }
        let result = book.result_mut(participant);
        match choice {
            Some(chosen) => RecordOutcome::Scored(apply_answer(
                result,
                index,
                question.correct,
                chosen,
                self.mark_per_correct,
                self.penalty_per_wrong,
            )),
            None => RecordOutcome::NoChoice,
        }
    }

    /// Make sure a participant shows up in the results even without answering.
    /// Returns `false` if they were already known or the session is closing.
    pub fn register_participant(&self, participant: Participant) -> bool {
        let mut book = lock(&self.book);
        if self.is_finished() || book.positions.contains_key(&participant.id) {
            return false;
        }
        book.result_mut(participant);
        true
    }

    pub fn participant_count(&self) -> usize {
        lock(&self.book).results.len()
    }

    /// Snapshot of a participant's running result.
    pub fn result_for(&self, user: UserId) -> Option<UserResult> {
        let book = lock(&self.book);
        book.positions.get(&user).map(|&p| book.results[p].clone())
    }

    /// Settle every result against the full question count and return them
    /// in first-seen order.
    pub(crate) fn settle_results(&self) -> Vec<UserResult> {
        let total = self.questions.len();
        let mut book = lock(&self.book);
        for result in &mut book.results {
            settle(result, total);
        }
        book.results.clone()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
