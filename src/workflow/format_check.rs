//! 模型输出结构检查
//!
//! 只检查决策段和推荐段的标签是否齐全，不解析内容。

/// 所有格式警告共有的标记，用于统计
pub const FORMAT_WARNING_MARKER: &str = "Format Warning";

const OPENING_TAGS: [&str; 2] = ["<decision>", "<recommendation>"];
const CLOSING_TAGS: [&str; 2] = ["</decision>", "</recommendation>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatWarning {
    /// 缺少开始标签
    MissingTags,
    /// 有开始标签但缺少结束标签
    UnclosedTags,
}

impl FormatWarning {
    pub fn annotation(self) -> &'static str {
        match self {
            FormatWarning::MissingTags => "(Format Warning: Missing Required Tags)",
            FormatWarning::UnclosedTags => "(Format Warning: Unclosed Tags)",
        }
    }
}

pub fn check_format(output: &str) -> Option<FormatWarning> {
    if !OPENING_TAGS.iter().all(|tag| output.contains(tag)) {
        Some(FormatWarning::MissingTags)
    } else if !CLOSING_TAGS.iter().all(|tag| output.contains(tag)) {
        Some(FormatWarning::UnclosedTags)
    } else {
        None
    }
}

/// 检查并在末尾追加警告标注
pub fn annotate(output: &str) -> (String, Option<FormatWarning>) {
    match check_format(output) {
        Some(warning) => (format!("{}{}", output, warning.annotation()), Some(warning)),
        None => (output.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = "<decision>\nTreatment Decision: 1\n</decision>\n<basis>x</basis>\n<recommendation>\nDES\n</recommendation>";

    #[test]
    fn test_complete_output_has_no_annotation() {
        assert_eq!(check_format(COMPLETE), None);
        let (text, warning) = annotate(COMPLETE);
        assert_eq!(text, COMPLETE);
        assert!(warning.is_none());
    }

    #[test]
    fn test_unclosed_tags() {
        let output = "<decision>1</decision><recommendation>DES";
        let (text, warning) = annotate(output);
        assert_eq!(warning, Some(FormatWarning::UnclosedTags));
        assert!(text.ends_with("(Format Warning: Unclosed Tags)"));
    }

    #[test]
    fn test_missing_tags() {
        let (text, warning) = annotate("PCI is recommended.");
        assert_eq!(warning, Some(FormatWarning::MissingTags));
        assert!(text.ends_with("(Format Warning: Missing Required Tags)"));
        assert!(text.contains(FORMAT_WARNING_MARKER));
    }

    #[test]
    fn test_one_opening_missing_counts_as_missing() {
        let output = "<decision>1</decision></recommendation>";
        assert_eq!(check_format(output), Some(FormatWarning::MissingTags));
    }
}
