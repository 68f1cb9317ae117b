/// Match lifecycle: start, answers, resync, finalization.
pub mod battle_service;
/// Limited-use item activation.
pub mod consumable_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Per-match Server-Sent Events broadcasting.
pub mod event_service;
/// Health check service.
pub mod health_service;
/// Background loop driving matches through their phases.
pub mod phase_driver;

#[cfg(test)]
pub(crate) mod testutil;
