//! 安全防护模块
//!
//! ## 子模块
//!
//! - **csrf**: 签名双重提交 Cookie 模式的 CSRF 防护
//!
//! ## CSRF 防护示例
//!
//! ```rust
//! use mailauth::security::csrf::{CsrfGuard, validate_csrf};
//!
//! let secret = b"my-secret-key-at-least-32-bytes!";
//! let guard = CsrfGuard::new(secret).unwrap();
//! let pair = guard.issue().unwrap();
//!
//! assert!(validate_csrf(&pair.cookie_value, &pair.form_value, secret));
//! ```

pub mod csrf;

pub use csrf::{CsrfGuard, CsrfPair, validate_csrf};
