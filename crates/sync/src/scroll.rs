/// Fires a loader when an end-of-list sentinel becomes visible.
///
/// The loader runs at most once per visibility transition. While the
/// sentinel stays visible it runs again only when [`Self::state_changed`]
/// observes the predicate going from false to true, e.g. once the previous
/// load finished and more pages remain.
pub struct ScrollTrigger<P, L> {
	should_load: P,
	load: L,
	visible: bool,
	/// Predicate value at the last evaluation while visible.
	last_ready: bool,
}

impl<P, L> ScrollTrigger<P, L>
where
	P: FnMut() -> bool,
	L: FnMut(),
{
	pub fn new(should_load: P, load: L) -> Self {
		Self {
			should_load,
			load,
			visible: false,
			last_ready: false,
		}
	}

	pub fn is_visible(&self) -> bool {
		self.visible
	}

	/// Reports sentinel visibility. Returns whether the loader ran.
	pub fn set_visible(&mut self, visible: bool) -> bool {
		if visible == self.visible {
			return false;
		}
		self.visible = visible;
		if !visible {
			self.last_ready = false;
			return false;
		}
		self.evaluate(true)
	}

	/// Re-evaluates the predicate after the observed state changed.
	/// Returns whether the loader ran.
	pub fn state_changed(&mut self) -> bool {
		if !self.visible {
			return false;
		}
		self.evaluate(false)
	}

	fn evaluate(&mut self, transition: bool) -> bool {
		let ready = (self.should_load)();
		let fire = ready && (transition || !self.last_ready);
		self.last_ready = ready;
		if fire {
			tracing::trace!("scroll.trigger");
			(self.load)();
		}
		fire
	}
}
