//! Sample exam content used by the seed command and by tests.

use crate::model::{ChoiceOption, ExamDefinition, ExamError, ExamId, Question};

/// Code under which the demo exam is seeded.
pub const DEMO_EXAM_CODE: &str = "exam1";

/// The "JavaScript Fundamentals Exam": three multiple-choice questions and
/// one essay, one hour long.
///
/// # Errors
///
/// Returns `ExamError` only if the fixture itself is malformed.
pub fn demo_exam() -> Result<ExamDefinition, ExamError> {
    let array_options = || {
        vec![
            ChoiceOption::new(1, "push()"),
            ChoiceOption::new(2, "pop()"),
            ChoiceOption::new(3, "shift()"),
            ChoiceOption::new(4, "unshift()"),
        ]
    };

    ExamDefinition::from_minutes(
        ExamId::new(1),
        "JavaScript Fundamentals Exam",
        60,
        vec![
            Question::multiple_choice(
                1,
                "What is the correct way to declare a variable in JavaScript?",
                vec![
                    ChoiceOption::new(1, "var x = 5;"),
                    ChoiceOption::new(2, "variable x = 5;"),
                    ChoiceOption::new(3, "x := 5;"),
                    ChoiceOption::new(4, "int x = 5;"),
                ],
                1,
            ),
            Question::multiple_choice(
                2,
                "Which method adds new elements to the end of an array?",
                array_options(),
                1,
            ),
            Question::multiple_choice(
                3,
                "Which method removes the first element of an array?",
                array_options(),
                3,
            ),
            Question::essay(4, "Explain the concept of closures in JavaScript.", 500),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_exam_is_valid() {
        let exam = demo_exam().unwrap();
        assert_eq!(exam.question_count(), 4);
        assert_eq!(exam.duration_seconds(), 3_600);
    }
}
