//! Auto-configuration catalogue for common service families. Each module pairs a properties
//! holder bound from a dotted configuration namespace with a conditionally-activated factory and
//! customizer seams, following the same shallow pattern throughout: if the relevant library is
//! provided and no user-supplied instance exists, construct a default-configured one from the
//! bound properties, apply customizers, register it.
//!
//! Library presence is declared through cargo features rather than detected at runtime: enabling
//! e.g. the `deadpool` feature makes [provided_libraries] include [library::DEADPOOL], which the
//! datasource conditions check for. Hosts assembling their own catalogue can ignore the features
//! and build a [Libraries] set by hand.
//!
//! Where several libraries can fill the same role, the selection order is an explicit, documented
//! constant in the respective module (e.g. [datasource::POOL_SELECTION_ORDER]) - the first
//! provided candidate wins, unless a property pins the choice.

pub mod cache;
pub mod datasource;
pub mod mail;
pub mod pulsar;
pub mod session;
pub mod web;

use bootwire::autoconfigure::conditions::Libraries;

/// Identifiers of the third-party libraries known to this catalogue.
pub mod library {
    pub const ACTIX: &str = "actix";
    pub const AXUM: &str = "axum";
    pub const DEADPOOL: &str = "deadpool";
    pub const LETTRE: &str = "lettre";
    pub const MOBC: &str = "mobc";
    pub const MOKA: &str = "moka";
    pub const PULSAR: &str = "pulsar";
    pub const R2D2: &str = "r2d2";
    pub const REDIS: &str = "redis";
    pub const SQLX: &str = "sqlx";
}

/// Libraries declared as provided through cargo features.
pub fn provided_libraries() -> Libraries {
    let mut libraries = Libraries::default();
    for (provided, name) in [
        (cfg!(feature = "actix"), library::ACTIX),
        (cfg!(feature = "axum"), library::AXUM),
        (cfg!(feature = "deadpool"), library::DEADPOOL),
        (cfg!(feature = "lettre"), library::LETTRE),
        (cfg!(feature = "mobc"), library::MOBC),
        (cfg!(feature = "moka"), library::MOKA),
        (cfg!(feature = "pulsar"), library::PULSAR),
        (cfg!(feature = "r2d2"), library::R2D2),
        (cfg!(feature = "redis"), library::REDIS),
        (cfg!(feature = "sqlx"), library::SQLX),
    ] {
        if provided {
            libraries.insert(name);
        }
    }

    libraries
}
