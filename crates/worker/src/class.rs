/// Execution classes used for task tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Long-lived push connection tasks.
	Stream,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Stream => "stream",
		}
	}
}
