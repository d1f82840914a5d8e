//! Code Assembler - turns candidate source into one runnable program per case.
//!
//! The harness appended to the candidate source calls the entry point with
//! the case's argument literal and prints the return value unless it is
//! `None`. Nothing here inspects the candidate source: a missing or broken
//! entry point shows up at run time as an error on stderr.

/// Build the program text for a single test case.
pub fn assemble(source: &str, entry_point: &str, input: &str) -> String {
    let source = source.trim();
    let mut program = String::with_capacity(source.len() + input.len() + 128);

    program.push_str(source);
    program.push_str("\n\n");
    program.push_str("if __name__ == '__main__':\n");
    program.push_str(&format!("    result = {}({})\n", entry_point, input));
    program.push_str("    if result is not None:\n");
    program.push_str("        print(result)\n");

    program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_layout() {
        let program = assemble("def solve(a, b):\n    return a + b\n", "solve", "1, 2");

        assert_eq!(
            program,
            "def solve(a, b):\n    return a + b\n\n\
             if __name__ == '__main__':\n    \
             result = solve(1, 2)\n    \
             if result is not None:\n        \
             print(result)\n"
        );
    }

    #[test]
    fn test_assemble_trims_source() {
        let program = assemble("\n\n  x = 1  \n\n", "solve", "");
        assert!(program.starts_with("x = 1\n\nif __name__"));
        assert!(program.contains("result = solve()\n"));
    }

    #[test]
    fn test_assemble_passes_input_verbatim() {
        let program = assemble("def solve(nums, target): pass", "solve", "[2,7,11,15], 9");
        assert!(program.contains("result = solve([2,7,11,15], 9)\n"));
    }

    #[test]
    fn test_assemble_uses_entry_point() {
        let program = assemble("def main(): return 1", "main", "");
        assert!(program.contains("result = main()\n"));
    }

    #[test]
    fn test_assemble_does_not_validate() {
        // no entry point at all is still a valid assembly
        let program = assemble("", "solve", "1");
        assert!(program.starts_with("\n\nif __name__ == '__main__':"));
    }
}
