//! String helpers used for log output.

/// Truncates an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
/// Counts characters, not bytes, so ids taken from a request path never
/// split a multibyte character.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("0123456789abcdef"), "01234567..");
		assert_eq!(truncate_id("01234567"), "01234567");
	}

	#[test]
	fn test_truncate_id_multibyte() {
		assert_eq!(truncate_id("订单号码123"), "订单号码123");
		assert_eq!(truncate_id("订单号码12345"), "订单号码1234..");
	}
}
