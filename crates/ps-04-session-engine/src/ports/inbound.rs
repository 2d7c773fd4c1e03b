//! # Session Handler
//!
//! Role behaviour is a `PartyRole` plus these callbacks. The engine decides
//! which messages a role accepts; the handler decides what to put in them.

use ps_02_ppm::PpmTemplate;
use shared_types::{Message, PartyKey};

use crate::domain::errors::SessionError;
use crate::domain::routing::Destination;
use crate::domain::wire::Logon;

/// Phase callbacks. Every method has a usable default.
pub trait SessionHandler: Send + Sync {
    /// Solver side: the template to ship in answer to `PPMH`.
    ///
    /// `None` means this party serves no template (the request is rejected).
    fn template_for(&self, _counterparty: &PartyKey) -> Option<PpmTemplate> {
        None
    }

    /// Trader side: accept the template the solver shipped.
    fn on_template(&self, _counterparty: &PartyKey, template: &PpmTemplate) -> Result<(), SessionError> {
        template.validate().map_err(SessionError::from)
    }

    /// Inspect the counterparty logon before the session enters `TRADE`.
    fn on_logon(&self, _counterparty: &PartyKey, _logon: &Logon) -> Result<(), SessionError> {
        Ok(())
    }

    /// Route an opaque trade message received in `TRADE`.
    fn on_trade(&self, _counterparty: &PartyKey, _message: &Message) -> Destination {
        Destination::Exchange
    }
}

/// Default handler: serves one fixed template (if any).
#[derive(Debug, Clone, Default)]
pub struct TemplateHandler {
    template: Option<PpmTemplate>,
}

impl TemplateHandler {
    /// Handler for a trader, which serves no template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for a solver shipping `template` to every counterparty.
    #[must_use]
    pub fn serving(template: PpmTemplate) -> Self {
        Self {
            template: Some(template),
        }
    }
}

impl SessionHandler for TemplateHandler {
    fn template_for(&self, _counterparty: &PartyKey) -> Option<PpmTemplate> {
        self.template.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_02_ppm::{LeafTemplate, PartyRef};
    use shared_types::PartyRole;

    fn key() -> PartyKey {
        PartyKey::new([2u8; 33])
    }

    fn template(action: &str) -> PpmTemplate {
        PpmTemplate {
            leaves: vec![LeafTemplate {
                action_type: action.into(),
                chain_id: 1,
                custody_contract: [0u8; 20],
                custody_state: 0,
                party: PartyRef::role(PartyRole::Trader),
                args: serde_json::json!({}),
                signers: None,
                attestations: Default::default(),
            }],
        }
    }

    #[test]
    fn test_trader_serves_nothing() {
        assert!(TemplateHandler::new().template_for(&key()).is_none());
        assert!(TemplateHandler::serving(template("updatePPM")).template_for(&key()).is_some());
    }

    #[test]
    fn test_default_on_template_validates() {
        let handler = TemplateHandler::new();
        assert!(handler.on_template(&key(), &template("updatePPM")).is_ok());
        let err = handler.on_template(&key(), &template("mint")).unwrap_err();
        assert_eq!(err.kind(), shared_types::ErrorKind::UnsupportedAction);
    }
}
