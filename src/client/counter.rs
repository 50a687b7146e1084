use num_traits::{CheckedAdd, CheckedSub, One, Zero};

/// Counts the tagged operations of one batch through both application steps.
///
/// `pending` counts down as operations are about to be applied, `completed` counts up after each was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown<C = u32>
where
	C: CheckedAdd + CheckedSub + One + Zero + Copy,
{
	total: C,
	pending: C,
	completed: C,
}

impl<C> Countdown<C>
where
	C: CheckedAdd + CheckedSub + One + Zero + Copy + PartialEq,
{
	#[must_use]
	pub fn new(total: C) -> Self {
		Self {
			total,
			pending: total,
			completed: C::zero(),
		}
	}

	/// Counts one operation as about to be applied. Returns whether it was the last one.
	///
	/// # Errors
	///
	/// Iff more operations began than the batch holds.
	pub fn begin(&mut self) -> Result<bool, CountSaturatedError> {
		self.pending = self.pending.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
		Ok(self.pending.is_zero())
	}

	/// Counts one operation as applied. Returns whether the whole batch now is.
	///
	/// # Errors
	///
	/// Iff more operations completed than the batch holds.
	pub fn finish(&mut self) -> Result<bool, CountSaturatedError> {
		let completed = self.completed.checked_add(&C::one()).ok_or(CountSaturatedError)?;
		if completed.checked_sub(&self.total).map_or(false, |excess| !excess.is_zero()) {
			return Err(CountSaturatedError);
		}
		self.completed = completed;
		Ok(self.completed == self.total)
	}

	#[must_use]
	pub fn total(&self) -> C {
		self.total
	}

	#[must_use]
	pub fn pending(&self) -> C {
		self.pending
	}

	#[must_use]
	pub fn completed(&self) -> C {
		self.completed
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountSaturatedError;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counts_both_steps() {
		let mut countdown = Countdown::<u32>::new(2);
		assert_eq!(countdown.begin(), Ok(false));
		assert_eq!(countdown.finish(), Ok(false));
		assert_eq!(countdown.begin(), Ok(true));
		assert_eq!(countdown.finish(), Ok(true));
		assert_eq!(countdown.begin(), Err(CountSaturatedError));
		assert_eq!(countdown.finish(), Err(CountSaturatedError));
		assert_eq!((countdown.pending(), countdown.completed()), (0, 2));
	}
}
