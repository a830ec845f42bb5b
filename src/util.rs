//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Case-insensitive, whitespace-trimmed normalization used for fill-gap
/// answer comparison.
pub fn normalize_answer(s: &str) -> String {
  s.trim().to_lowercase()
}

/// Truncate a string to at most `max` characters (not bytes), used before
/// shipping source material to the model.
pub fn truncate_chars(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Strip an optional `data:<mime>;base64,` prefix from an uploaded payload.
pub fn strip_data_url(s: &str) -> &str {
  match s.split_once(',') {
    Some((head, rest)) if head.starts_with("data:") => rest,
    _ => s,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_fills_all_keys() {
    let out = fill_template("mode={mode} count={count}", &[("mode", "Theory"), ("count", "5")]);
    assert_eq!(out, "mode=Theory count=5");
  }

  #[test]
  fn answer_normalization_is_case_and_whitespace_insensitive() {
    assert_eq!(normalize_answer(" Paris "), normalize_answer("paris"));
    assert_eq!(normalize_answer("Mitochondria "), "mitochondria");
  }

  #[test]
  fn char_truncation_respects_boundaries() {
    assert_eq!(truncate_chars("héllo", 2), "hé");
    assert_eq!(truncate_chars("abc", 10), "abc");
  }

  #[test]
  fn data_url_prefix_is_stripped() {
    assert_eq!(strip_data_url("data:image/jpeg;base64,QUJD"), "QUJD");
    assert_eq!(strip_data_url("QUJD"), "QUJD");
  }
}
