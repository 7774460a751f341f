//! Session orchestration for a headless connect device.
//!
//! A [`Session`] authenticates to the accesspoint with a
//! [`CredentialSource`], trades the resulting stored credential for a
//! Login5 access token, opens the spclient and dealer with that token, and
//! then routes pushed events until it is closed:
//!
//! - **[`Session::connect`]** runs every step in order and fails fast with a
//!   [`ConnectStage`] naming the step that failed.
//! - **[`Session::run`]** is the event loop. The first pusher-connection
//!   message yields the connection id and announces the device with a
//!   `NEW_DEVICE` state publish; a logout message closes the session.
//! - **[`Session::close`]** never blocks and may be called from anywhere,
//!   including the loop's own handlers.
//!
//! The static [`DeviceDescriptor`] that goes into every publish is built
//! from [`SessionConfig`].

pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod product_info;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{SessionConfig, derive_device_id};
pub use credentials::CredentialSource;
pub use device::DeviceDescriptor;
pub use error::{ConnectStage, CoreError};
pub use product_info::ProductInfo;
pub use session::{Route, Session, SessionState};
