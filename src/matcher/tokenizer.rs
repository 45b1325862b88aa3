//! 分词模块
//!
//! 中英文混合分词，用于观察文本与步骤定义的相似度计算。
//! 中文使用 jieba-rs 分词；英文按非字母数字切分，去停用词并做简单词尾归一（grinding → grind）。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "he", "her",
    "his", "in", "into", "is", "it", "its", "of", "on", "onto", "or", "she", "that", "the",
    "their", "them", "then", "there", "they", "this", "to", "up", "was", "were", "with", "user",
    "person", "now", "的", "了", "在", "是", "着", "和", "把", "用户", "正在",
];

/// 判断字符是否为 CJK（中日韩）字符
pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |   // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |   // CJK Unified Ideographs Extension A
        '\u{F900}'..='\u{FAFF}' |   // CJK Compatibility Ideographs
        '\u{3040}'..='\u{309F}' |   // Hiragana
        '\u{30A0}'..='\u{30FF}'     // Katakana
    )
}

/// 判断文本是否包含 CJK 字符
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 英文词尾归一：去掉 -ing / -ed / -s，保留至少 3 个字母的词干
fn stem(word: &str) -> String {
    if !word.chars().all(|c| c.is_ascii_alphabetic()) {
        return word.to_string();
    }
    for suffix in ["ing", "ed"] {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped.to_string();
            }
        }
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn normalize(raw: &str) -> Option<String> {
    let token: String = raw
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if token.is_empty() || STOP_WORDS.contains(&token.as_str()) {
        return None;
    }
    let first = token.chars().next()?;
    if token.chars().count() == 1 && !is_cjk(first) {
        return None;
    }
    Some(stem(&token))
}

/// 智能分词：根据文本内容自动选择分词策略
/// - 包含 CJK 字符时使用 jieba 分词（搜索引擎模式，更细粒度）
/// - 否则按非字母数字字符切分
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .filter_map(normalize)
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter_map(normalize)
            .collect()
    }
}

/// 分词并返回词集合（用于相似度计算）
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// `part` 中的词有多大比例出现在 `whole` 中
pub fn containment(part: &HashSet<String>, whole: &HashSet<String>) -> f32 {
    if part.is_empty() || whole.is_empty() {
        return 0.0;
    }
    part.intersection(whole).count() as f32 / part.len() as f32
}

/// Dice 系数：2|A∩B| / (|A|+|B|)
pub fn dice_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    2.0 * intersection / (set1.len() + set2.len()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_english() {
        let tokens = tokenize("The user is grinding coffee beans.");
        assert!(tokens.contains(&"grind".to_string()));
        assert!(tokens.contains(&"coffee".to_string()));
        assert!(tokens.contains(&"bean".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"user".to_string()));
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("用户正在研磨咖啡豆");
        assert!(!tokens.is_empty());
        assert!(tokens.iter().any(|t| t.contains("咖啡") || t.contains("研磨")));
    }

    #[test]
    fn test_tokenize_mixed() {
        let tokens = tokenize("我在用 grinder 磨咖啡");
        assert!(tokens.iter().any(|t| t == "grinder"));
        assert!(tokens.iter().any(|t| t.contains("咖啡")));
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("...!?").is_empty());
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("pouring"), "pour");
        assert_eq!(stem("heated"), "heat");
        assert_eq!(stem("kettles"), "kettle");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("bring"), "bring");
        assert_eq!(stem("need"), "need");
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("你好"));
        assert!(contains_cjk("Hello 世界"));
        assert!(!contains_cjk("Hello World"));
    }

    #[test]
    fn test_containment() {
        let cue = tokenize_to_set("kettle on the stove");
        let obs = tokenize_to_set("a kettle is sitting on the stove top");
        assert!((containment(&cue, &obs) - 1.0).abs() < 1e-6);
        let other = tokenize_to_set("pouring milk");
        assert_eq!(containment(&cue, &other), 0.0);
    }

    #[test]
    fn test_dice_similarity() {
        let a = tokenize_to_set("pour hot water");
        let b = tokenize_to_set("pour water slowly");
        let sim = dice_similarity(&a, &b);
        assert!(sim > 0.0 && sim < 1.0);
        assert!((dice_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }
}
