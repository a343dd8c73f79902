//! Consumer-side analysis of channel messages.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "30s", "500ms")
//! - [`window`]: Fixed-capacity trailing window ([`SlidingWindow`])
//! - [`monitor`]: Smoker drop detection ([`SmokerMonitor`], [`AlertPolicy`], [`Observation`])
//!
//! ## Data Flow
//!
//! ```text
//! ChannelMessage (decoded payload)
//!        │
//!        ▼
//! SmokerMonitor::observe()
//!        │
//!        ├──▶ SlidingWindow::push() (evicts oldest at capacity)
//!        │
//!        └──▶ Observation (Filling | Normal | Alert | Incomplete)
//! ```

pub mod duration;
pub mod monitor;
pub mod window;

pub use monitor::{AlertPolicy, Observation, SmokerMonitor};
pub use window::SlidingWindow;
