// Handlers grouped by access tier:
// public (no gate) and protected (behind a permission gate in routes.rs).
pub mod protected;
pub mod public;
