// Domain-specific error types
pub mod errors;

// Tradable securities and their metadata
pub mod securities;

// Core trading domain: positions, trades, cash flows, portfolio, fees
pub mod trading;

// Background job scheduling primitives
pub mod scheduling;

// Venues and market-hours data
pub mod market;

// Planning pipeline types: candidates, sequences, plans
pub mod planning;

// Hot-readable behavioral settings (§6.4)
pub mod settings;

// External collaborator contracts (§6.3)
pub mod ports;

// Repository trait abstractions over the seven stores (§3, §6.1)
pub mod repositories;

// Intra-process event kinds (§4.7)
pub mod events;

// Circuit breaker halt levels and windfall cooldown state (§4.6)
pub mod risk;
