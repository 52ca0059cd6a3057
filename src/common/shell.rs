//! Shell utility functions
//!
//! Used to render external commands in logs and dry-run output so that they
//! can be copied back into a terminal verbatim.

/// Escape a string for use in a shell command
///
/// This function quotes the string only if necessary (i.e., if it contains characters
/// that have special meaning in the shell). It uses single quotes for safety.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '%'))
    {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Render a program and its arguments as a single shell-quoted line.
pub fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(shell_quote(program))
        .chain(args.iter().map(|a| shell_quote(a.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("foo"), "foo");
        assert_eq!(shell_quote("foo bar"), "'foo bar'");
        assert_eq!(shell_quote("foo'bar"), "'foo'\\''bar'");
        assert_eq!(shell_quote("/dev/nvme0n1p2"), "/dev/nvme0n1p2");
        assert_eq!(shell_quote("100%"), "100%");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(
            command_line("parted", &["-s", "/dev/sdb", "mkpart", "EFI", "fat32", "1MiB", "513MiB"]),
            "parted -s /dev/sdb mkpart EFI fat32 1MiB 513MiB"
        );
        assert_eq!(command_line("mount", &["a b", "/mnt"]), "mount 'a b' /mnt");
    }
}
