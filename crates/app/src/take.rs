use std::time::Duration;

use anyhow::{Context, Result};
use exam_core::model::{AnswerValue, ExamCode, Question};
use services::exam::ClockOutcome;
use services::{
    DeliveryStatus, ExamSessionController, SessionConfig, SessionView, SubmissionGate,
    SubmissionReceipt,
};
use storage::repository::ExamContentProvider;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::input::{HELP, Input};

/// How long `take` waits for the sink before leaving delivery to the outbox.
const DELIVERY_WAIT: Duration = Duration::from_secs(30);

/// Play one exam on stdin/stdout until it is submitted or abandoned.
pub async fn run(
    exams: &dyn ExamContentProvider,
    code: &ExamCode,
    gate: SubmissionGate,
    config: SessionConfig,
) -> Result<()> {
    let mut controller = ExamSessionController::load(exams, code, gate, config)
        .await
        .with_context(|| format!("could not open exam `{code}`"))?;
    tracing::info!(%code, "exam opened");

    render(&controller.view());
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            outcome = controller.pump() => match outcome {
                ClockOutcome::Ticked { remaining } => {
                    if remaining % 60 == 0 || remaining <= 10 {
                        println!("time left: {}", services::exam::format_countdown(remaining));
                    }
                }
                ClockOutcome::TimedOut(receipt) => {
                    println!("\nTime is up. Your answers were submitted.");
                    return report(receipt).await;
                }
                ClockOutcome::Discarded => {}
                ClockOutcome::Stopped => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let input = match Input::parse(&line) {
                    Ok(input) => input,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                match input {
                    Input::Quit => break,
                    Input::Submit => {
                        if let Some(receipt) = controller.submit() {
                            println!("\nExam submitted.");
                            return report(receipt).await;
                        }
                    }
                    Input::Help => println!("{HELP}"),
                    other => {
                        if let Err(err) = apply(&mut controller, other) {
                            println!("{err}");
                        }
                        render(&controller.view());
                    }
                }
            }
        }
    }

    if let Some(receipt) = controller.receipt().cloned() {
        return report(receipt).await;
    }
    controller.close();
    println!("Left the exam without submitting.");
    Ok(())
}

fn apply(controller: &mut ExamSessionController, input: Input) -> Result<(), services::SessionError> {
    match input {
        Input::Next => controller.next().map(|_| ()),
        Input::Previous => controller.previous().map(|_| ()),
        Input::GoTo(index) => controller.go_to(index).map(|_| ()),
        Input::Choose(option) => controller.answer_current(AnswerValue::choice(option)),
        Input::Write(text) => controller.answer_current(AnswerValue::text(text)),
        Input::Redraw | Input::Help | Input::Submit | Input::Quit => Ok(()),
    }
}

async fn report(receipt: SubmissionReceipt) -> Result<()> {
    let mut delivery = receipt.delivery.clone();
    let status = match tokio::time::timeout(
        DELIVERY_WAIT,
        delivery.wait_for(|status| !status.is_pending()),
    )
    .await
    {
        Ok(Ok(status)) => status.clone(),
        Ok(Err(_)) | Err(_) => DeliveryStatus::Pending,
    };

    println!(
        "submission {} ({}, {} answered)",
        receipt.snapshot.submission_id(),
        receipt.reason(),
        receipt.snapshot.answers().len()
    );
    match status {
        DeliveryStatus::Delivered(ack) => println!("received, receipt {}", ack.receipt),
        DeliveryStatus::Queued { attempts, error } => {
            println!(
                "warning: could not deliver after {attempts} attempts ({error}); \
                 saved locally, run `app outbox` to retry"
            );
        }
        DeliveryStatus::Failed { attempts, error } => {
            anyhow::bail!("submission was not accepted after {attempts} attempts: {error}");
        }
        DeliveryStatus::Pending => {
            println!("warning: the server has not answered yet; delivery continues in the background");
        }
    }
    Ok(())
}

fn render(view: &SessionView) {
    let palette: String = view
        .answered
        .iter()
        .enumerate()
        .map(|(i, answered)| {
            let mark = if *answered { 'x' } else { ' ' };
            if i == view.current_index {
                format!("<{mark}>")
            } else {
                format!("[{mark}]")
            }
        })
        .collect();

    println!();
    if view.is_submitted() {
        println!("{}  |  submitted", view.title);
        return;
    }
    println!("{}  |  time left {}  |  {}", view.title, view.countdown(), view.status);
    println!(
        "question {} of {}  {palette}  ({:.0}%)",
        view.current_index + 1,
        view.question_count,
        view.progress() * 100.0
    );
    println!("{}", view.current_question.text());

    let current = view.current_answer();
    match &view.current_question {
        Question::MultipleChoice { options, .. } => {
            for option in options {
                let chosen = matches!(current, Some(AnswerValue::Choice(id)) if *id == option.id);
                let mark = if chosen { '*' } else { ' ' };
                println!(" {mark} {}) {}", option.id, option.text);
            }
        }
        Question::Essay { max_length, .. } => {
            match current {
                Some(AnswerValue::Text(text)) => {
                    println!("  your answer ({}/{max_length}): {text}", text.chars().count());
                }
                _ => println!("  (no answer yet, up to {max_length} characters)"),
            }
        }
    }
    if view.is_last_question() {
        println!("last question: `s` to submit");
    }
}
