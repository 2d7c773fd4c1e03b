//! End-to-end flows across the signature, PPM, mesh and engine crates.

#[cfg(test)]
mod custody_actions;
#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod tcp_session;
