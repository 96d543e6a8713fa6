//! UI utilities for the client.

use std::io::Write;

/// Redisplay the prompt after receiving a message
pub fn redisplay_prompt(user_label: &str) {
    print!("{}> ", user_label);
    std::io::stdout().flush().ok();
}
