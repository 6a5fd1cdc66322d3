mod common;

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use common::abc_quiz;
use study_session::{
    QuestionVariant, Quiz, QuizQuestion, QuizSession, QuizType, SessionState, SharedQuiz,
};

fn quiz_from(questions: Vec<QuizQuestion>, quiz_type: QuizType) -> SharedQuiz {
    Arc::new(Quiz {
        id: Uuid::new_v4(),
        source_document_id: "42".to_string(),
        title: "Cell biology".to_string(),
        quiz_type,
        questions,
        created_at: Utc::now(),
    })
}

fn abc() -> SharedQuiz {
    quiz_from(abc_quiz().questions, QuizType::MultipleChoice)
}

fn play(session: &mut QuizSession, answers: &[&str]) {
    for answer in answers {
        session.answer(*answer);
        session.next();
    }
}

#[test]
fn test_partial_score_rounds_to_nearest_percent() {
    let mut session = QuizSession::new(abc()).unwrap();

    play(&mut session, &["A", "X", "C"]);
    let score = session.score().unwrap();

    assert_eq!(score.correct, 2);
    assert_eq!(score.total, 3);
    assert!((score.percentage - 66.666).abs() < 0.01);
    assert_eq!(score.rounded_percent, 67);
    assert!(!score.results[1].is_correct);
    assert_eq!(score.results[1].given_answer, "X");
    assert_eq!(score.results[1].correct_answer, "B");
}

#[test]
fn test_perfect_and_zero_scores() {
    let mut perfect = QuizSession::new(abc()).unwrap();
    play(&mut perfect, &["A", "B", "C"]);
    let score = perfect.score().unwrap();
    assert_eq!((score.correct, score.rounded_percent), (3, 100));

    let mut zero = QuizSession::new(abc()).unwrap();
    play(&mut zero, &["C", "A", "B"]);
    let score = zero.score().unwrap();
    assert_eq!((score.correct, score.rounded_percent), (0, 0));
}

#[test]
fn test_next_completes_exactly_once_on_final_call() {
    let quiz = abc();
    let mut session = QuizSession::new(quiz.clone()).unwrap();
    let mut completions = 0;

    for call in 1..=quiz.questions.len() {
        let was_completed = session.is_completed();
        let state = session.next();
        if !was_completed && state == SessionState::Completed {
            completions += 1;
            assert_eq!(call, quiz.questions.len(), "completed before the final call");
        }
    }

    assert_eq!(completions, 1);
    assert_eq!(session.current_index(), quiz.questions.len() - 1);
}

#[test]
fn test_reset_restores_fresh_state_from_any_point() {
    let mut session = QuizSession::new(abc()).unwrap();

    session.answer("A");
    session.next();
    session.answer("B");
    session.reset();
    assert_eq!(session.answers(), &["", "", ""]);
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.state(), SessionState::InProgress);

    play(&mut session, &["A", "B", "C"]);
    assert!(session.is_completed());
    session.reset();
    assert_eq!(session.answers(), &["", "", ""]);
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.state(), SessionState::InProgress);
    assert!(session.score().is_err());
}

#[test]
fn test_unanswered_questions_can_still_be_passed_and_score_zero() {
    let mut session = QuizSession::new(abc()).unwrap();

    assert!(!session.can_advance());
    session.next();
    session.next();
    session.next();

    let score = session.score().unwrap();
    assert_eq!(score.correct, 0);
    assert!(score.results.iter().all(|r| r.given_answer.is_empty()));
}

#[test]
fn test_one_machine_drives_every_variant() {
    let quiz = quiz_from(
        vec![
            QuizQuestion {
                id: "mc".to_string(),
                prompt: "Largest organelle?".to_string(),
                variant: QuestionVariant::MultipleChoice {
                    options: vec!["Nucleus".into(), "Ribosome".into(), "Vacuole".into()],
                },
                correct_answer: "Nucleus".to_string(),
            },
            QuizQuestion {
                id: "tf".to_string(),
                prompt: "Bacteria have a nucleus".to_string(),
                variant: QuestionVariant::TrueFalse,
                correct_answer: "false".to_string(),
            },
            QuizQuestion {
                id: "fib".to_string(),
                prompt: "The powerhouse of the cell is the ____".to_string(),
                variant: QuestionVariant::FillInBlank,
                correct_answer: "mitochondria".to_string(),
            },
        ],
        QuizType::Mixed,
    );
    let mut session = QuizSession::new(quiz).unwrap();

    let choices = session.current_question().answer_choices().unwrap();
    session.answer(choices[0].clone());
    session.next();

    assert_eq!(
        session.current_question().answer_choices().unwrap(),
        vec!["true".to_string(), "false".to_string()]
    );
    session.answer("false");
    session.next();

    assert!(session.current_question().answer_choices().is_none());
    session.answer("Mitochondria");
    assert_eq!(session.next(), SessionState::Completed);

    let score = session.score().unwrap();
    assert_eq!(score.correct, 2, "fill-in-the-blank is graded by exact match");
    println!("✅ mixed quiz scored {}/{}", score.correct, score.total);
}
