//! Git ref-name sanitization and branch naming.

use chrono::Local;

/// Rewrite `name` into a valid git ref name.
///
/// Every character outside `[A-Za-z0-9._/-]` becomes `_`. Then `..`, `//`,
/// leading `/`, `.` or `-`, trailing `/` or `.`, path components starting with
/// `.` and a trailing `.lock` are rewritten until nothing changes, so the
/// function is idempotent.
pub fn sanitize_ref_name(name: &str) -> String {
    let mut current: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    loop {
        let next = sanitize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        "branch".to_string()
    } else {
        current
    }
}

fn sanitize_pass(name: &str) -> String {
    let mut s = name.replace("..", "_").replace("//", "/").replace("/.", "/_");

    if s.starts_with('/') || s.starts_with('.') || s.starts_with('-') {
        s.replace_range(..1, "_");
    }
    if s.ends_with('/') || s.ends_with('.') {
        let len = s.len();
        s.replace_range(len - 1.., "_");
    }
    if let Some(stem) = s.strip_suffix(".lock") {
        s = format!("{}_lock", stem);
    }
    s
}

/// Whether `name` only uses the characters the sanitizer emits.
pub fn is_safe_ref_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
        && !name.contains("..")
        && !name.contains("@{")
}

/// Timestamp used in branch names and PR titles.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Branch opened by the developer node: `AI_Generated_Developer_<base>_<ts>`.
pub fn developer_branch(base_name: &str, timestamp: &str) -> String {
    sanitize_ref_name(&format!("AI_Generated_Developer_{}_{}", base_name, timestamp))
}

/// Branch opened by the test agent when no developer branch exists.
pub fn tests_branch(base_name: &str, timestamp: &str) -> String {
    sanitize_ref_name(&format!("AI_Generated_Tests_{}_{}", base_name, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_forbidden_characters() {
        let branch = sanitize_ref_name("Tests for [my/func]@{v1}");
        assert!(!branch.contains('['));
        assert!(!branch.contains(']'));
        assert!(!branch.contains("@{"));
        assert!(!branch.contains(".."));
        assert!(is_safe_ref_name(&branch));
        assert_eq!(branch, "Tests_for__my/func___v1_");
    }

    #[test]
    fn test_sanitize_ref_grammar() {
        assert_eq!(sanitize_ref_name("a..b"), "a_b");
        assert_eq!(sanitize_ref_name("a...b"), "a_.b");
        assert_eq!(sanitize_ref_name("feature/"), "feature_");
        assert_eq!(sanitize_ref_name("release."), "release_");
        assert_eq!(sanitize_ref_name("topic.lock"), "topic_lock");
        assert_eq!(sanitize_ref_name("a//b"), "a/b");
        assert_eq!(sanitize_ref_name("x/.hidden"), "x/_hidden");
        assert_eq!(sanitize_ref_name("~^:?*\\ "), "______");
        assert_eq!(sanitize_ref_name(""), "branch");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "Tests for [my/func]@{v1}",
            "a....b/.lock",
            "..//..",
            "name.lock.lock",
            "-/x/",
            "ñandú feliz",
            ".",
        ];
        for input in inputs {
            let once = sanitize_ref_name(input);
            assert_eq!(sanitize_ref_name(&once), once, "input: {:?}", input);
            assert!(is_safe_ref_name(&once), "unsafe output {:?}", once);
        }
    }

    #[test]
    fn test_branch_names() {
        assert_eq!(
            developer_branch("sumar", "20250101_120000"),
            "AI_Generated_Developer_sumar_20250101_120000"
        );
        assert_eq!(
            tests_branch("my func", "1"),
            "AI_Generated_Tests_my_func_1"
        );
    }
}
