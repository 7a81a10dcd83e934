//! 标签目录：标签名到标签、标签类型的映射

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::LibraryError;

pub type TagId = i64;
pub type TagTypeId = i64;

/// 标签类型，仅用于展示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagType {
    pub id: TagTypeId,
    pub label: String,
    /// 显示在标签前的单个符号
    pub symbol: char,
    /// RGB 颜色
    pub color: u32,
}

impl TagType {
    pub fn new(
        id: TagTypeId,
        label: impl Into<String>,
        symbol: char,
        color: u32,
    ) -> Result<Self, LibraryError> {
        let label = label.into();
        if label.chars().next().is_none_or(char::is_whitespace) {
            return Err(LibraryError::InvalidTagType(format!("illegal label '{}'", label)));
        }
        if !is_valid_symbol(symbol) {
            return Err(LibraryError::InvalidTagType(format!("illegal symbol '{}'", symbol)));
        }
        Ok(Self { id, label, symbol, color: color & 0xff_ffff })
    }
}

/// 符号不能是单词字符，也不能与查询语法冲突
fn is_valid_symbol(symbol: char) -> bool {
    !(symbol.is_alphanumeric()
        || symbol == '_'
        || symbol.is_whitespace()
        || matches!(symbol, '+' | '(' | ')' | '\\' | ':' | '-'))
}

/// 标签名只能由字母、数字和下划线组成
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: TagId,
    pub label: String,
    pub type_id: Option<TagTypeId>,
    /// 复合标签的定义，本身是一条查询
    pub definition: Option<String>,
}

impl Tag {
    pub fn new(
        id: TagId,
        label: impl Into<String>,
        type_id: Option<TagTypeId>,
        definition: Option<String>,
    ) -> Result<Self, LibraryError> {
        let label = label.into();
        if !is_valid_label(&label) {
            return Err(LibraryError::InvalidLabel(label));
        }
        Ok(Self { id, label, type_id, definition })
    }

    pub fn is_compound(&self) -> bool {
        self.definition.is_some()
    }
}

/// 查询标签时返回的信息
#[derive(Debug, Clone, Copy)]
pub struct TagInfo<'a> {
    pub tag: &'a Tag,
    pub tag_type: Option<&'a TagType>,
}

/// 解析器读取标签的接口，所有方法都不应有副作用
pub trait TagCatalog {
    fn lookup(&self, label: &str) -> Option<TagInfo<'_>>;

    fn definition_of(&self, label: &str) -> Option<&str> {
        self.lookup(label).and_then(|info| info.tag.definition.as_deref())
    }

    /// 标签集合或定义每次改变时递增
    fn version(&self) -> u64;
}

/// 版本号在所有目录之间全局递增，重新加载后也不会与旧版本重复
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// 内存中的标签目录
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tags: HashMap<String, Tag>,
    types: BTreeMap<TagTypeId, TagType>,
    version: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tag(&self, label: &str) -> Option<&Tag> {
        self.tags.get(label)
    }

    /// 按标签名排序返回所有标签
    pub fn tags(&self) -> Vec<&Tag> {
        let mut tags = self.tags.values().collect::<Vec<_>>();
        tags.sort_by(|a, b| a.label.cmp(&b.label));
        tags
    }

    pub fn tag_type(&self, id: TagTypeId) -> Option<&TagType> {
        self.types.get(&id)
    }

    pub fn tag_types(&self) -> impl Iterator<Item = &TagType> {
        self.types.values()
    }

    pub fn next_tag_id(&self) -> TagId {
        self.tags.values().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn next_type_id(&self) -> TagTypeId {
        self.types.keys().next_back().copied().unwrap_or(0) + 1
    }

    fn bump_version(&mut self) {
        self.version = NEXT_VERSION.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_type(&mut self, tag_type: TagType) -> Result<(), LibraryError> {
        if let Some(other) = self.types.values().find(|t| {
            t.id != tag_type.id && (t.label == tag_type.label || t.symbol == tag_type.symbol)
        }) {
            return Err(LibraryError::InvalidTagType(format!(
                "conflicts with existing type '{}'",
                other.label
            )));
        }
        self.types.insert(tag_type.id, tag_type);
        Ok(())
    }

    /// 删除标签类型，引用它的标签变为无类型
    pub fn remove_type(&mut self, id: TagTypeId) -> Result<TagType, LibraryError> {
        let removed = self.types.remove(&id).ok_or(LibraryError::UnknownTagType(id))?;
        for tag in self.tags.values_mut() {
            if tag.type_id == Some(id) {
                tag.type_id = None;
            }
        }
        Ok(removed)
    }

    pub fn insert_tag(&mut self, tag: Tag) -> Result<(), LibraryError> {
        if self.tags.contains_key(&tag.label) {
            return Err(LibraryError::DuplicateTag(tag.label));
        }
        if let Some(type_id) = tag.type_id {
            if !self.types.contains_key(&type_id) {
                return Err(LibraryError::UnknownTagType(type_id));
            }
        }
        self.tags.insert(tag.label.clone(), tag);
        self.bump_version();
        Ok(())
    }

    pub fn remove_tag(&mut self, label: &str) -> Result<Tag, LibraryError> {
        let tag = self.tags.remove(label).ok_or_else(|| LibraryError::UnknownTag(label.into()))?;
        self.bump_version();
        Ok(tag)
    }

    /// 修改标签定义，传入 `None` 时变回普通标签
    pub fn set_definition(
        &mut self,
        label: &str,
        definition: Option<String>,
    ) -> Result<(), LibraryError> {
        let tag = self.tags.get_mut(label).ok_or_else(|| LibraryError::UnknownTag(label.into()))?;
        if tag.definition != definition {
            tag.definition = definition;
            self.bump_version();
        }
        Ok(())
    }

    pub fn set_type(
        &mut self,
        label: &str,
        type_id: Option<TagTypeId>,
    ) -> Result<(), LibraryError> {
        if let Some(type_id) = type_id {
            if !self.types.contains_key(&type_id) {
                return Err(LibraryError::UnknownTagType(type_id));
            }
        }
        let tag = self.tags.get_mut(label).ok_or_else(|| LibraryError::UnknownTag(label.into()))?;
        tag.type_id = type_id;
        Ok(())
    }
}

impl TagCatalog for Catalog {
    fn lookup(&self, label: &str) -> Option<TagInfo<'_>> {
        let tag = self.tags.get(label)?;
        let tag_type = tag.type_id.and_then(|id| self.types.get(&id));
        Some(TagInfo { tag, tag_type })
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn tag(id: TagId, label: &str, definition: Option<&str>) -> Tag {
        Tag::new(id, label, None, definition.map(String::from)).unwrap()
    }

    #[rstest]
    #[case("cat", true)]
    #[case("black_cat_2", true)]
    #[case("猫", true)]
    #[case("", false)]
    #[case("black cat", false)]
    #[case("a-b", false)]
    #[case("a:b", false)]
    fn test_label_validation(#[case] label: &str, #[case] valid: bool) {
        assert_eq!(is_valid_label(label), valid);
    }

    #[rstest]
    #[case('@', true)]
    #[case('#', true)]
    #[case('a', false)]
    #[case('_', false)]
    #[case(' ', false)]
    #[case('+', false)]
    #[case(':', false)]
    #[case('-', false)]
    #[case('(', false)]
    fn test_symbol_validation(#[case] symbol: char, #[case] valid: bool) {
        assert_eq!(TagType::new(1, "character", symbol, 0).is_ok(), valid);
    }

    #[test]
    fn test_type_label_must_not_start_with_whitespace() {
        assert!(TagType::new(1, " character", '@', 0).is_err());
        assert!(TagType::new(1, "", '@', 0).is_err());
    }

    #[test]
    fn test_lookup() {
        let mut catalog = Catalog::new();
        catalog.insert_type(TagType::new(1, "character", '@', 0xff0000).unwrap()).unwrap();
        catalog.insert_tag(Tag::new(1, "alice", Some(1), None).unwrap()).unwrap();
        catalog.insert_tag(tag(2, "pets", Some("cat + dog"))).unwrap();

        let info = catalog.lookup("alice").unwrap();
        assert_eq!(info.tag_type.unwrap().symbol, '@');
        assert_eq!(catalog.definition_of("alice"), None);
        assert_eq!(catalog.definition_of("pets"), Some("cat + dog"));
        assert!(catalog.lookup("Alice").is_none());
    }

    #[test]
    fn test_version_changes_with_definitions() {
        let mut catalog = Catalog::new();
        let v0 = catalog.version();
        catalog.insert_tag(tag(1, "pets", Some("cat"))).unwrap();
        let v1 = catalog.version();
        assert!(v1 > v0);

        // 定义不变时版本不变
        catalog.set_definition("pets", Some("cat".into())).unwrap();
        assert_eq!(catalog.version(), v1);

        catalog.set_definition("pets", Some("cat + dog".into())).unwrap();
        assert!(catalog.version() > v1);
    }

    #[test]
    fn test_duplicates() {
        let mut catalog = Catalog::new();
        catalog.insert_tag(tag(1, "cat", None)).unwrap();
        assert_eq!(
            catalog.insert_tag(tag(2, "cat", None)),
            Err(LibraryError::DuplicateTag("cat".into()))
        );

        catalog.insert_type(TagType::new(1, "character", '@', 0).unwrap()).unwrap();
        assert!(catalog.insert_type(TagType::new(2, "artist", '@', 0).unwrap()).is_err());
        assert!(catalog.insert_type(TagType::new(2, "character", '#', 0).unwrap()).is_err());
    }

    #[test]
    fn test_remove_type_clears_references() {
        let mut catalog = Catalog::new();
        catalog.insert_type(TagType::new(1, "character", '@', 0).unwrap()).unwrap();
        catalog.insert_tag(Tag::new(1, "alice", Some(1), None).unwrap()).unwrap();
        catalog.remove_type(1).unwrap();
        assert_eq!(catalog.tag("alice").unwrap().type_id, None);
        assert_eq!(catalog.remove_type(1), Err(LibraryError::UnknownTagType(1)));
    }

    #[test]
    fn test_unknown_type() {
        let mut catalog = Catalog::new();
        let err = catalog.insert_tag(Tag::new(1, "alice", Some(7), None).unwrap());
        assert_eq!(err, Err(LibraryError::UnknownTagType(7)));
    }
}
