/// Solidity free-memory-pointer preamble that opens the deployment code
const PREAMBLE: &str = "6080604052";

/// CBOR metadata headers appended by solc (`bzzr0` then `ipfs`)
const METADATA_MARKERS: [&str; 2] = ["a265627a7a72315820", "a264697066735822"];

/// Split of a contract's creation bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeParts {
    /// Constructor and runtime code up to the metadata marker
    pub context: String,
    /// Metadata marker, compiler metadata and constructor arguments
    pub args: String,
}

/// Splits creation bytecode at the first known compiler-metadata marker.
///
/// The context starts at the Solidity preamble when one is present. Without a marker the
/// whole bytecode is the context and the arguments are empty.
pub fn split_bytecode(bytecode: &str) -> BytecodeParts {
    let code = bytecode.strip_prefix("0x").unwrap_or(bytecode);
    let marker = METADATA_MARKERS
        .iter()
        .find_map(|marker| code.find(marker));

    let Some(end) = marker else {
        return BytecodeParts {
            context: bytecode.to_string(),
            args: String::new(),
        };
    };

    let start = code.find(PREAMBLE).filter(|start| *start < end).unwrap_or(0);
    BytecodeParts {
        context: code[start..end].to_string(),
        args: code[end..].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_ipfs_marker() {
        let bytecode = "0x6080604052348015600f57600080fd5ba264697066735822beef0033000000000000000000000000000000000000000000000000000000000000002a";
        let parts = split_bytecode(bytecode);
        assert_eq!(parts.context, "6080604052348015600f57600080fd5b");
        assert!(parts.args.starts_with("a264697066735822beef0033"));
        assert!(parts.args.ends_with("2a"));
    }

    #[test]
    fn test_split_prefers_bzzr_marker_and_skips_leading_bytes() {
        let parts = split_bytecode("ff6080604052aaa265627a7a72315820bba264697066735822cc");
        assert_eq!(parts.context, "6080604052aa");
        assert_eq!(parts.args, "a265627a7a72315820bba264697066735822cc");
    }

    #[test]
    fn test_unmarked_bytecode_is_kept_whole() {
        let parts = split_bytecode("0x600160020300");
        assert_eq!(parts.context, "0x600160020300");
        assert_eq!(parts.args, "");
    }
}
