//! Glob matching for key scans.
//!
//! Supports the subset of Redis `KEYS` syntax the service relies on:
//! `*` matches any run of characters (including none) and `?` matches
//! exactly one character. Every other character matches itself.

/// Returns true when `key` matches the glob `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
	let pattern: Vec<char> = pattern.chars().collect();
	let key: Vec<char> = key.chars().collect();

	let (mut p, mut k) = (0, 0);
	// Position of the last `*` seen and the key index it was tried at.
	let mut backtrack: Option<(usize, usize)> = None;

	while k < key.len() {
		match pattern.get(p) {
			Some('*') => {
				backtrack = Some((p, k));
				p += 1;
			},
			Some('?') => {
				p += 1;
				k += 1;
			},
			Some(c) if *c == key[k] => {
				p += 1;
				k += 1;
			},
			_ => match backtrack {
				Some((star, star_k)) => {
					p = star + 1;
					k = star_k + 1;
					backtrack = Some((star, star_k + 1));
				},
				None => return false,
			},
		}
	}

	pattern[p..].iter().all(|c| *c == '*')
}
