//! 前缀路由表
//!
//! [`PathPatternMap`] 按注册顺序保存 `(前缀, 值)`。处理器查找取最长的匹配前缀，
//! 过滤器查找返回所有匹配项（按注册顺序）。

use std::fmt;

/// 前缀到值的映射
///
/// ```
/// use webi_web::router::PathPatternMap;
///
/// let mut routes = PathPatternMap::new();
/// routes.put("/", "root");
/// routes.put("/rest/", "rest");
///
/// assert_eq!(routes.get("/rest/hallo/world/"), Some(&"rest"));
/// assert_eq!(routes.trim_context("/rest/hallo/world/"), "/hallo/world/");
/// assert_eq!(routes.get("/index.html"), Some(&"root"));
/// ```
pub struct PathPatternMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> PathPatternMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 注册，同一前缀可以注册多次：`get` 取最后一次，`get_all` 返回全部
    pub fn put(&mut self, prefix: impl Into<String>, value: V) {
        self.entries.push((prefix.into(), value));
    }

    /// 最长匹配前缀对应的值
    pub fn get(&self, path: &str) -> Option<&V> {
        self.longest_match(path).map(|(_, value)| value)
    }

    /// 最长匹配前缀
    pub fn matched_prefix(&self, path: &str) -> Option<&str> {
        self.longest_match(path).map(|(prefix, _)| prefix.as_str())
    }

    /// 所有匹配的值，按注册顺序
    pub fn get_all(&self, path: &str) -> Vec<&V> {
        self.entries
            .iter()
            .filter(|(prefix, _)| matches(prefix, path))
            .map(|(_, value)| value)
            .collect()
    }

    /// 最长匹配值及去掉前缀后的路径
    pub fn resolve(&self, path: &str) -> Option<(&V, String)> {
        self.longest_match(path)
            .map(|(prefix, value)| (value, strip(prefix, path)))
    }

    /// 最长匹配的前缀、值和剩余路径
    pub fn route(&self, path: &str) -> Option<(&str, &V, String)> {
        self.longest_match(path)
            .map(|(prefix, value)| (prefix.as_str(), value, strip(prefix, path)))
    }

    /// 去掉最长匹配前缀，结果总是以 `/` 开头；没有匹配时原样返回
    pub fn trim_context(&self, path: &str) -> String {
        match self.longest_match(path) {
            Some((prefix, _)) => strip(prefix, path),
            None => path.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn longest_match(&self, path: &str) -> Option<&(String, V)> {
        // 长度相同时后注册的优先
        self.entries
            .iter()
            .filter(|(prefix, _)| matches(prefix, path))
            .fold(None, |best: Option<&(String, V)>, entry| match best {
                Some(current) if current.0.len() > entry.0.len() => Some(current),
                _ => Some(entry),
            })
    }
}

impl<V> Default for PathPatternMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for PathPatternMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(prefix, _)| prefix))
            .finish()
    }
}

/// `/rest` 也匹配前缀 `/rest/`
fn matches(prefix: &str, path: &str) -> bool {
    path.starts_with(prefix)
        || prefix
            .strip_suffix('/')
            .is_some_and(|bare| !bare.is_empty() && path == bare)
}

fn strip(prefix: &str, path: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or("");
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    }
}
