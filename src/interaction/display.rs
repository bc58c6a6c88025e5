//! Message display implementation

/// Trait for displaying messages
pub trait MessageDisplay: Send + Sync {
    fn info(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    fn success(&self, message: &str);
}

/// Real implementation writing to the terminal
pub struct MessageDisplayImpl;

impl Default for MessageDisplayImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDisplayImpl {
    pub fn new() -> Self {
        Self
    }
}

impl MessageDisplay for MessageDisplayImpl {
    fn info(&self, message: &str) {
        println!("ℹ️  {message}");
    }

    fn warning(&self, message: &str) {
        eprintln!("⚠️  {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn success(&self, message: &str) {
        println!("✅ {message}");
    }
}
