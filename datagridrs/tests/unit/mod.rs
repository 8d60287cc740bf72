// Engine-level tests against scripted backends.
mod support;

mod engine_counts;
mod engine_probe;
mod engine_resilience;
mod planner_invariants;
