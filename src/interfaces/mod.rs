//! Collaborators the core treats as external (§1): the trusted-local HTTP
//! control surface (§6.2). Everything under here talks to `application`
//! through the same repository/service traits the jobs and the trading
//! loop use -- no handler invents its own guardrail or persistence path.

pub mod http;
