//! # Party References
//!
//! Symbolic signers in a PPM template, resolved to concrete keys per session:
//!
//! - `Role`: the trader's or solver's own key
//! - `Guardian`: the Nth guardian key of a party
//! - `Multisig`: the aggregate key over a combination of other references
//!
//! Both sides of a session resolve from their own point of view and reach the
//! same keys, because `SessionKeys` maps roles (not "us"/"them") to keys.

use std::fmt;

use ps_01_signature::aggregate_keys;
use serde::{Deserialize, Serialize};
use shared_types::{PartyKey, PartyRole};

use super::errors::PpmError;

/// A symbolic party reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PartyRef {
    Role { role: PartyRole },
    Guardian { party: PartyRole, index: usize },
    Multisig { members: Vec<PartyRef> },
}

impl PartyRef {
    #[must_use]
    pub fn role(role: PartyRole) -> Self {
        Self::Role { role }
    }

    #[must_use]
    pub fn guardian(party: PartyRole, index: usize) -> Self {
        Self::Guardian { party, index }
    }

    #[must_use]
    pub fn multisig(members: Vec<PartyRef>) -> Self {
        Self::Multisig { members }
    }

    /// Resolve to the single key this reference stands for.
    ///
    /// A multisig resolves to the aggregate of its members.
    pub fn resolve(&self, keys: &SessionKeys) -> Result<PartyKey, PpmError> {
        match self {
            Self::Role { role } => Ok(keys.key_for(*role)),
            Self::Guardian { party, index } => keys
                .guardians_for(*party)
                .get(*index)
                .copied()
                .ok_or_else(|| PpmError::UnresolvedParty(self.to_string())),
            Self::Multisig { members } => {
                if members.is_empty() {
                    return Err(PpmError::UnresolvedParty(self.to_string()));
                }
                let resolved = members
                    .iter()
                    .map(|member| member.resolve(keys))
                    .collect::<Result<Vec<_>, _>>()?;
                aggregate_keys(&resolved)
                    .map(|aggregate| aggregate.party_key())
                    .map_err(|e| PpmError::UnresolvedParty(format!("{self}: {e}")))
            }
        }
    }

    /// Resolve to every individual key that must attest on its own.
    ///
    /// Nested multisigs are flattened.
    pub fn signer_keys(&self, keys: &SessionKeys) -> Result<Vec<PartyKey>, PpmError> {
        match self {
            Self::Multisig { members } => {
                if members.is_empty() {
                    return Err(PpmError::UnresolvedParty(self.to_string()));
                }
                let mut out = Vec::new();
                for member in members {
                    out.extend(member.signer_keys(keys)?);
                }
                out.sort();
                out.dedup();
                Ok(out)
            }
            single => Ok(vec![single.resolve(keys)?]),
        }
    }
}

impl fmt::Display for PartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role } => write!(f, "{role}"),
            Self::Guardian { party, index } => write!(f, "{party}.guardian[{index}]"),
            Self::Multisig { members } => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str("+")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

/// Key material a session renders its PPM from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub own_role: PartyRole,
    pub own_key: PartyKey,
    pub own_guardians: Vec<PartyKey>,
    pub counterparty_key: PartyKey,
    pub counterparty_guardians: Vec<PartyKey>,
}

impl SessionKeys {
    /// Key of the party playing `role`.
    #[must_use]
    pub fn key_for(&self, role: PartyRole) -> PartyKey {
        if role == self.own_role {
            self.own_key
        } else {
            self.counterparty_key
        }
    }

    /// Guardian keys of the party playing `role`.
    #[must_use]
    pub fn guardians_for(&self, role: PartyRole) -> &[PartyKey] {
        if role == self.own_role {
            &self.own_guardians
        } else {
            &self.counterparty_guardians
        }
    }

    /// The same keys seen from the counterparty's side.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        Self {
            own_role: self.own_role.counterpart(),
            own_key: self.counterparty_key,
            own_guardians: self.counterparty_guardians.clone(),
            counterparty_key: self.own_key,
            counterparty_guardians: self.own_guardians.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_01_signature::KeyPair;

    fn keys() -> SessionKeys {
        SessionKeys {
            own_role: PartyRole::Trader,
            own_key: KeyPair::generate().party_key(),
            own_guardians: vec![KeyPair::generate().party_key()],
            counterparty_key: KeyPair::generate().party_key(),
            counterparty_guardians: vec![
                KeyPair::generate().party_key(),
                KeyPair::generate().party_key(),
            ],
        }
    }

    #[test]
    fn test_role_resolution() {
        let keys = keys();
        assert_eq!(
            PartyRef::role(PartyRole::Trader).resolve(&keys).unwrap(),
            keys.own_key
        );
        assert_eq!(
            PartyRef::role(PartyRole::Solver).resolve(&keys).unwrap(),
            keys.counterparty_key
        );
    }

    #[test]
    fn test_guardian_resolution() {
        let keys = keys();
        assert_eq!(
            PartyRef::guardian(PartyRole::Solver, 1).resolve(&keys).unwrap(),
            keys.counterparty_guardians[1]
        );
        assert!(matches!(
            PartyRef::guardian(PartyRole::Trader, 3).resolve(&keys),
            Err(PpmError::UnresolvedParty(_))
        ));
    }

    #[test]
    fn test_multisig_resolves_to_aggregate() {
        let keys = keys();
        let multisig = PartyRef::multisig(vec![
            PartyRef::role(PartyRole::Trader),
            PartyRef::role(PartyRole::Solver),
        ]);
        let expected = aggregate_keys(&[keys.own_key, keys.counterparty_key])
            .unwrap()
            .party_key();
        assert_eq!(multisig.resolve(&keys).unwrap(), expected);
        assert_eq!(multisig.signer_keys(&keys).unwrap().len(), 2);
    }

    #[test]
    fn test_resolution_agrees_across_sides() {
        let keys = keys();
        let other_side = keys.mirrored();
        let multisig = PartyRef::multisig(vec![
            PartyRef::role(PartyRole::Trader),
            PartyRef::guardian(PartyRole::Solver, 0),
        ]);
        assert_eq!(
            multisig.resolve(&keys).unwrap(),
            multisig.resolve(&other_side).unwrap()
        );
    }

    #[test]
    fn test_display_and_serde() {
        let multisig = PartyRef::multisig(vec![
            PartyRef::role(PartyRole::Trader),
            PartyRef::guardian(PartyRole::Solver, 0),
        ]);
        assert_eq!(multisig.to_string(), "trader+solver.guardian[0]");
        let json = serde_json::to_value(&multisig).unwrap();
        assert_eq!(json["kind"], "multisig");
        assert_eq!(json["members"][1]["kind"], "guardian");
        let back: PartyRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, multisig);
    }
}
