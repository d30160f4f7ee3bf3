//! Demo: run the HTN planner over a short debate transcript.
//!
//! This demo demonstrates:
//! 1. Building a Discourse State from pre-segmented speaker turns
//! 2. Running the planner with the default method library
//! 3. Reading claims, frames and reference resolutions from the result

use dialectic::methods::{default_registry, transcript_root_task};
use dialectic::{DiscourseState, HtnPlanner, Span, SpeakerTurn};

fn main() {
    let lines = [
        ("Moderator", "Our topic tonight is the new employment report."),
        ("Alice", "The report shows unemployment decreased by 15% this year."),
        ("Bob", "But that figure ignores the data on part-time work. He cherry-picks."),
        ("Alice", "That is wrong because the survey methodology was controlled."),
    ];

    // Upstream preprocessing would normally produce these turns; the core
    // never re-segments.
    let mut text = String::new();
    let mut turns = Vec::new();
    for (i, (speaker, line)) in lines.iter().enumerate() {
        if !text.is_empty() {
            text.push(' ');
        }
        let start = text.len();
        text.push_str(line);
        turns.push(SpeakerTurn {
            speaker: (*speaker).to_string(),
            text: (*line).to_string(),
            span: Span::new(start, start + line.len()),
            turn_index: i,
        });
    }

    let mut state = DiscourseState::from_transcript("demo-debate", text.clone(), turns);
    let planner = HtnPlanner::new(default_registry());
    let result = planner.run(transcript_root_task(text.len()), &mut state);

    println!("success: {}", result.success);
    println!(
        "tasks executed: {}, backtracks: {}, elapsed: {}ms",
        result.stats.tasks_executed, result.stats.backtracks, result.stats.elapsed_ms
    );

    println!("\nclaims:");
    for artifact in result.claims() {
        let claim = artifact.as_claim().unwrap();
        println!(
            "  [{:?} {:.2}] {}: {}",
            claim.claim_type,
            claim.confidence,
            claim.speaker.as_deref().unwrap_or("?"),
            claim.text
        );
    }

    println!("\nframes:");
    for artifact in result.frames() {
        let frame = artifact.as_frame().unwrap();
        println!(
            "  {} [{:?}] parent={:?} claims={}",
            artifact.id,
            frame.role,
            frame.parent_frame_id,
            frame.child_claim_ids.len()
        );
    }

    println!("\nresolutions:");
    for artifact in result.resolutions() {
        let resolution = artifact.as_resolution().unwrap();
        println!(
            "  {:?} [{:?} {:.2}] -> {:?}",
            resolution.source_text, resolution.status, resolution.confidence, resolution.winner
        );
    }

    println!("\nunresolved references: {}", result.unresolved_references.len());
}
