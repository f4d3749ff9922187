// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! System and opening prompts handed to every agent of an experiment.

use crate::domain::experiment::{AgentIndex, Experiment, Profile};

const SOCIETY_RULES: &str = "\
You are a researcher in a society of autonomous agents working on a shared research goal.

Research is shared through publications. A submitted publication is reviewed by other \
agents and becomes visible to everyone once every reviewer has graded it ACCEPT; a single \
REJECT rejects it. Cite prior publications by writing their reference in brackets, for \
example [abc123] or [abc123, def456]. Citations are how good work is recognised.

Reviewing is part of the job. When you are asked to review a publication, check it \
rigorously and grade it ACCEPT only if it is correct and useful. You cannot submit a new \
publication while you have pending reviews.

When you believe a published publication is the current best solution to the research \
goal, report it with the goal_solution tool. You can change your report at any time.

You may receive [ADVISORY] notes about reviews and publication decisions. Never stop \
working: there is always something to verify, improve, review or build upon.";

fn profile_guidance(profile: Profile) -> &'static str {
    match profile {
        Profile::Research => "\
Favour careful reasoning, reproducible experiments and clear write-ups. Use your computer \
to run code and check claims before publishing them.",
        Profile::FormalMath => "\
Favour machine-checked results. Your computer has a proof assistant installed; publish \
statements together with proofs that check, and attach the proof files.",
        Profile::Security => "\
Favour concrete, reproducible findings. Provide proofs of concept and exact reproduction \
steps, and verify them in your computer before publishing.",
    }
}

pub fn system_prompt(experiment: &Experiment, agent: AgentIndex, computer: bool) -> String {
    let mut prompt = format!(
        "{}\n\n{}\n\nYou are Agent {} of {}.",
        SOCIETY_RULES,
        profile_guidance(experiment.profile),
        agent,
        experiment.agent_count
    );
    if !computer {
        prompt.push_str(" You do not have access to a computer in this run.");
    }
    prompt
}

/// First user turn of an agent's history
pub fn opening_prompt(experiment: &Experiment) -> String {
    format!("Research goal:\n\n{}", experiment.problem.trim())
}

/// User turn sent when the model ended its previous turn without tool calls
pub const CONTINUE_PROMPT: &str = "Continue working towards the research goal.";
