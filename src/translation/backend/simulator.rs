//! 离线词典替换模拟器
//!
//! 对固定的英汉词表做整词替换，不访问网络、没有随机性。
//! 用作回退链的最后一环，也用于测试。
//!
//! - [`Simulator::new`]：输出 `"{替换结果}\n【原文】{原文}"`，原文可追溯
//! - [`Simulator::plain`]：只输出替换结果，分段翻译后拼接与整段翻译一致

use std::collections::HashMap;

use async_trait::async_trait;
use regex::{Captures, Regex};

use super::{BackendKind, TranslationBackend};
use crate::translation::error::BackendError;

/// 原文标记
pub const ORIGINAL_MARKER: &str = "【原文】";

/// 英汉词表，重复的词以后出现的为准
const DICTIONARY: &[(&str, &str)] = &[
    // 基础
    ("the", "这个"),
    ("a", "一个"),
    ("an", "一个"),
    ("and", "和"),
    ("is", "是"),
    ("are", "是"),
    ("in", "在"),
    ("to", "到"),
    ("of", "的"),
    ("for", "为了"),
    ("with", "与"),
    ("by", "通过"),
    ("on", "在...上"),
    ("at", "在"),
    ("from", "从"),
    ("as", "作为"),
    ("or", "或者"),
    ("not", "不"),
    ("but", "但是"),
    ("it", "它"),
    ("they", "他们"),
    ("we", "我们"),
    ("you", "你"),
    ("he", "他"),
    ("she", "她"),
    ("this", "这个"),
    ("that", "那个"),
    ("these", "这些"),
    ("those", "那些"),
    ("there", "那里"),
    ("here", "这里"),
    ("when", "当"),
    ("where", "哪里"),
    ("why", "为什么"),
    ("how", "如何"),
    ("what", "什么"),
    ("who", "谁"),
    ("which", "哪个"),
    ("will", "将会"),
    ("would", "会"),
    ("could", "可能会"),
    ("should", "应该"),
    ("can", "能够"),
    ("may", "可能"),
    ("might", "可能"),
    ("must", "必须"),
    ("have", "有"),
    ("has", "有"),
    ("had", "有"),
    ("do", "做"),
    ("does", "做"),
    ("did", "做"),
    ("been", "曾是"),
    ("being", "正在"),
    ("be", "是"),
    ("was", "是"),
    ("were", "是"),
    ("more", "更多"),
    ("most", "最多"),
    ("some", "一些"),
    ("any", "任何"),
    ("no", "没有"),
    ("all", "所有"),
    ("many", "许多"),
    ("much", "很多"),
    ("few", "几个"),
    ("little", "一点"),
    ("other", "其他"),
    ("another", "另一个"),
    ("such", "这样的"),
    ("so", "如此"),
    ("than", "比"),
    ("then", "然后"),
    ("thus", "因此"),
    ("though", "虽然"),
    ("although", "尽管"),
    ("if", "如果"),
    ("unless", "除非"),
    ("while", "当...时"),
    ("because", "因为"),
    ("since", "自从"),
    ("until", "直到"),
    ("after", "之后"),
    ("before", "之前"),
    ("during", "期间"),
    ("under", "在...下"),
    ("over", "超过"),
    ("through", "通过"),
    ("throughout", "遍及"),
    ("between", "之间"),
    ("among", "在...之中"),
    ("within", "在...之内"),
    ("without", "没有"),
    ("about", "关于"),
    ("against", "反对"),
    ("around", "围绕"),
    ("beyond", "超出"),
    ("across", "穿过"),
    ("along", "沿着"),
    ("upon", "在...之上"),
    ("next", "下一个"),
    ("previous", "前一个"),
    ("last", "最后"),
    ("first", "第一"),
    ("second", "第二"),
    ("third", "第三"),
    // 学术
    ("introduction", "介绍"),
    ("chapter", "章节"),
    ("section", "部分"),
    ("book", "书"),
    ("page", "页面"),
    ("example", "示例"),
    ("content", "内容"),
    ("reference", "参考"),
    ("author", "作者"),
    ("title", "标题"),
    ("figure", "图"),
    ("table", "表"),
    ("image", "图像"),
    ("note", "注释"),
    ("summary", "总结"),
    ("conclusion", "结论"),
    ("information", "信息"),
    ("data", "数据"),
    ("research", "研究"),
    ("analysis", "分析"),
    ("theory", "理论"),
    ("method", "方法"),
    ("process", "过程"),
    ("result", "结果"),
    ("discussion", "讨论"),
    ("study", "研究"),
    ("experiment", "实验"),
    ("observation", "观察"),
    ("measurement", "测量"),
    ("calculation", "计算"),
    ("evidence", "证据"),
    ("argument", "论点"),
    ("hypothesis", "假设"),
    ("conclusion", "结论"),
    ("findings", "发现"),
    ("abstract", "摘要"),
    ("publication", "出版物"),
    ("journal", "期刊"),
    ("article", "文章"),
    ("citation", "引用"),
    ("bibliography", "参考文献"),
    ("appendix", "附录"),
    ("footnote", "脚注"),
    ("glossary", "术语表"),
    ("preface", "前言"),
    ("foreword", "序言"),
    ("acknowledgment", "致谢"),
    ("index", "索引"),
    // 科技
    ("computer", "计算机"),
    ("software", "软件"),
    ("hardware", "硬件"),
    ("program", "程序"),
    ("system", "系统"),
    ("network", "网络"),
    ("internet", "互联网"),
    ("technology", "技术"),
    ("device", "设备"),
    ("application", "应用"),
    ("code", "代码"),
    ("file", "文件"),
    ("memory", "内存"),
    ("storage", "存储"),
    ("processor", "处理器"),
    ("algorithm", "算法"),
    ("database", "数据库"),
    ("user", "用户"),
    ("interface", "界面"),
    ("digital", "数字的"),
    ("electronic", "电子的"),
    ("intelligence", "智能"),
    ("artificial", "人工的"),
    // 日常
    ("time", "时间"),
    ("year", "年"),
    ("month", "月"),
    ("day", "日"),
    ("hour", "小时"),
    ("minute", "分钟"),
    ("second", "秒"),
    ("today", "今天"),
    ("tomorrow", "明天"),
    ("yesterday", "昨天"),
    ("world", "世界"),
    ("country", "国家"),
    ("city", "城市"),
    ("place", "地方"),
    ("home", "家"),
    ("office", "办公室"),
    ("building", "建筑"),
    ("room", "房间"),
    ("door", "门"),
    ("window", "窗户"),
    ("wall", "墙"),
    ("floor", "地板"),
    ("ceiling", "天花板"),
    ("road", "道路"),
    ("street", "街道"),
    ("path", "路径"),
    ("car", "汽车"),
    ("train", "火车"),
    ("plane", "飞机"),
    ("boat", "船"),
    ("bus", "公交车"),
    ("bike", "自行车"),
    ("walk", "走路"),
    ("run", "跑步"),
    ("food", "食物"),
    ("water", "水"),
    ("air", "空气"),
    ("light", "光"),
    ("fire", "火"),
    ("earth", "地球"),
    ("sun", "太阳"),
    ("moon", "月亮"),
    ("star", "星星"),
    ("sky", "天空"),
];

/// 词典替换模拟器
#[derive(Debug, Clone)]
pub struct Simulator {
    words: HashMap<&'static str, &'static str>,
    word_pattern: Regex,
    annotate: bool,
}

impl Simulator {
    /// 带原文标注的模拟器
    pub fn new() -> Self {
        Self::build(true)
    }

    /// 不带原文标注的模拟器
    pub fn plain() -> Self {
        Self::build(false)
    }

    fn build(annotate: bool) -> Self {
        let words = DICTIONARY.iter().copied().collect();
        Self {
            words,
            word_pattern: Regex::new(r"\b[A-Za-z]+\b").expect("静态正则表达式"),
            annotate,
        }
    }

    /// 纯函数：任何输入都返回结果，带标注时结果包含原文
    pub fn simulate(&self, text: &str) -> String {
        let substituted = self.substitute(text);
        if self.annotate {
            format!("{}\n{}{}", substituted, ORIGINAL_MARKER, text)
        } else {
            substituted
        }
    }

    /// 整词替换：全小写或首字母大写的词都查小写形式
    fn substitute(&self, text: &str) -> String {
        self.word_pattern
            .replace_all(text, |caps: &Captures| {
                let word = &caps[0];
                self.lookup(word)
                    .map(str::to_string)
                    .unwrap_or_else(|| word.to_string())
            })
            .into_owned()
    }

    fn lookup(&self, word: &str) -> Option<&'static str> {
        let lower = word.to_ascii_lowercase();
        if word == lower || word == capitalize(&lower) {
            self.words.get(lower.as_str()).copied()
        } else {
            None
        }
    }

    pub fn dictionary_len(&self) -> usize {
        self.words.len()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[async_trait]
impl TranslationBackend for Simulator {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulator
    }

    fn max_input_chars(&self) -> Option<usize> {
        None
    }

    async fn translate(&self, text: &str) -> Result<String, BackendError> {
        Ok(self.simulate(text))
    }
}
