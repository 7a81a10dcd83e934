//! 标签倒排索引和图片元数据表

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Serialize;

use crate::error::LibraryError;
use crate::hamming::Fingerprint;

pub type ImageId = i64;

/// 图片元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: ImageId,
    pub path: String,
    /// 不含扩展名的文件名
    pub name: String,
    /// 不含 `.` 的扩展名
    pub extension: String,
    pub fingerprint: Option<Fingerprint>,
}

impl Image {
    pub fn new(id: ImageId, path: impl Into<String>, fingerprint: Option<Fingerprint>) -> Self {
        let path = path.into();
        let (name, extension) = split_path(&path);
        Self { id, path, name, extension, fingerprint }
    }
}

fn split_path(path: &str) -> (String, String) {
    let path = Path::new(path);
    let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path.extension().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    (name, extension)
}

/// 标签到图片集合的倒排索引
///
/// 所有修改都只更新受影响的倒排列表，不会重建整个索引。
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    images: BTreeMap<ImageId, Image>,
    paths: HashMap<String, ImageId>,
    postings: HashMap<String, BTreeSet<ImageId>>,
    image_tags: HashMap<ImageId, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn next_image_id(&self) -> ImageId {
        self.images.keys().next_back().copied().unwrap_or(0) + 1
    }

    /// 当前登记的所有图片 ID
    pub fn universe(&self) -> BTreeSet<ImageId> {
        self.images.keys().copied().collect()
    }

    pub fn images(&self) -> &BTreeMap<ImageId, Image> {
        &self.images
    }

    pub fn metadata_of(&self, id: ImageId) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn image_by_path(&self, path: &str) -> Option<&Image> {
        self.paths.get(path).and_then(|id| self.images.get(id))
    }

    pub fn images_with_tag(&self, label: &str) -> Option<&BTreeSet<ImageId>> {
        self.postings.get(label)
    }

    /// 拥有该标签的图片数量
    pub fn posting_len(&self, label: &str) -> usize {
        self.postings.get(label).map_or(0, BTreeSet::len)
    }

    pub fn tags_of(&self, id: ImageId) -> Option<&BTreeSet<String>> {
        self.image_tags.get(&id)
    }

    /// 没有任何标签的图片
    pub fn untagged(&self) -> Vec<ImageId> {
        self.images
            .keys()
            .filter(|id| self.image_tags.get(id).is_none_or(BTreeSet::is_empty))
            .copied()
            .collect()
    }

    pub fn insert_image(&mut self, image: Image) -> Result<(), LibraryError> {
        if self.paths.contains_key(&image.path) {
            return Err(LibraryError::DuplicatePath(image.path));
        }
        if let Some(old) = self.images.get(&image.id) {
            return Err(LibraryError::DuplicatePath(old.path.clone()));
        }
        self.paths.insert(image.path.clone(), image.id);
        self.images.insert(image.id, image);
        Ok(())
    }

    /// 删除图片，同时删除它在倒排列表中的所有记录
    pub fn remove_image(&mut self, id: ImageId) -> Result<Image, LibraryError> {
        let image = self.images.remove(&id).ok_or(LibraryError::UnknownImage(id))?;
        self.paths.remove(&image.path);
        for label in self.image_tags.remove(&id).unwrap_or_default() {
            self.remove_posting(&label, id);
        }
        Ok(image)
    }

    /// 移动图片，ID 和标签保持不变
    pub fn move_image(&mut self, id: ImageId, path: impl Into<String>) -> Result<(), LibraryError> {
        let path = path.into();
        if self.paths.get(&path).is_some_and(|other| *other != id) {
            return Err(LibraryError::DuplicatePath(path));
        }
        let image = self.images.get_mut(&id).ok_or(LibraryError::UnknownImage(id))?;
        self.paths.remove(&image.path);
        self.paths.insert(path.clone(), id);
        *image = Image::new(id, path, image.fingerprint);
        Ok(())
    }

    pub fn set_fingerprint(
        &mut self,
        id: ImageId,
        fingerprint: Option<Fingerprint>,
    ) -> Result<(), LibraryError> {
        let image = self.images.get_mut(&id).ok_or(LibraryError::UnknownImage(id))?;
        image.fingerprint = fingerprint;
        Ok(())
    }

    /// 给图片添加标签，返回是否新增
    pub fn tag(&mut self, id: ImageId, label: &str) -> Result<bool, LibraryError> {
        if !self.images.contains_key(&id) {
            return Err(LibraryError::UnknownImage(id));
        }
        let added = self.image_tags.entry(id).or_default().insert(label.to_string());
        if added {
            self.postings.entry(label.to_string()).or_default().insert(id);
        }
        Ok(added)
    }

    /// 移除图片的标签，返回是否存在
    pub fn untag(&mut self, id: ImageId, label: &str) -> Result<bool, LibraryError> {
        if !self.images.contains_key(&id) {
            return Err(LibraryError::UnknownImage(id));
        }
        let removed = self.image_tags.get_mut(&id).is_some_and(|tags| tags.remove(label));
        if removed {
            self.remove_posting(label, id);
        }
        Ok(removed)
    }

    /// 用新的标签集合替换图片原有的标签
    pub fn set_tags<I, S>(&mut self, id: ImageId, labels: I) -> Result<(), LibraryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.images.contains_key(&id) {
            return Err(LibraryError::UnknownImage(id));
        }
        let new = labels.into_iter().map(Into::into).collect::<BTreeSet<String>>();
        let old = self.image_tags.remove(&id).unwrap_or_default();
        for label in old.difference(&new) {
            self.remove_posting(label, id);
        }
        for label in new.difference(&old) {
            self.postings.entry(label.clone()).or_default().insert(id);
        }
        self.image_tags.insert(id, new);
        Ok(())
    }

    /// 标签被删除时，清理它的倒排列表
    pub fn drop_tag(&mut self, label: &str) {
        for id in self.postings.remove(label).unwrap_or_default() {
            if let Some(tags) = self.image_tags.get_mut(&id) {
                tags.remove(label);
            }
        }
    }

    fn remove_posting(&mut self, label: &str, id: ImageId) {
        if let Some(posting) = self.postings.get_mut(label) {
            posting.remove(&id);
            if posting.is_empty() {
                self.postings.remove(label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TagIndex {
        let mut index = TagIndex::new();
        index.insert_image(Image::new(1, "photos/cat.jpg", Some(0))).unwrap();
        index.insert_image(Image::new(2, "photos/dog.PNG", None)).unwrap();
        index.insert_image(Image::new(3, "photos/bird", None)).unwrap();
        index.set_tags(1, ["cat", "pet"]).unwrap();
        index.set_tags(2, ["dog", "pet"]).unwrap();
        index
    }

    #[test]
    fn test_image_metadata() {
        let image = Image::new(1, "photos/awesome pic.tar.gz", None);
        assert_eq!(image.name, "awesome pic.tar");
        assert_eq!(image.extension, "gz");

        let image = Image::new(2, "photos/README", None);
        assert_eq!(image.name, "README");
        assert_eq!(image.extension, "");
    }

    #[test]
    fn test_postings() {
        let index = index();
        assert_eq!(index.images_with_tag("pet").unwrap(), &BTreeSet::from([1, 2]));
        assert_eq!(index.posting_len("cat"), 1);
        assert!(index.images_with_tag("bird").is_none());
        assert_eq!(index.untagged(), vec![3]);
    }

    #[test]
    fn test_set_tags_patches_postings() {
        let mut index = index();
        index.set_tags(1, ["cat", "cute"]).unwrap();
        assert_eq!(index.images_with_tag("pet").unwrap(), &BTreeSet::from([2]));
        assert_eq!(index.images_with_tag("cute").unwrap(), &BTreeSet::from([1]));
        assert_eq!(index.tags_of(1).unwrap().len(), 2);
    }

    #[test]
    fn test_tag_and_untag() {
        let mut index = index();
        assert!(index.tag(3, "bird").unwrap());
        assert!(!index.tag(3, "bird").unwrap());
        assert!(index.untagged().is_empty());
        assert!(index.untag(3, "bird").unwrap());
        assert!(!index.untag(3, "bird").unwrap());
        assert!(index.images_with_tag("bird").is_none());
        assert_eq!(index.tag(9, "bird"), Err(LibraryError::UnknownImage(9)));
    }

    #[test]
    fn test_remove_image() {
        let mut index = index();
        let image = index.remove_image(1).unwrap();
        assert_eq!(image.path, "photos/cat.jpg");
        assert!(index.images_with_tag("cat").is_none());
        assert_eq!(index.images_with_tag("pet").unwrap(), &BTreeSet::from([2]));
        assert!(index.image_by_path("photos/cat.jpg").is_none());
        assert_eq!(index.universe(), BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_move_image_keeps_identity() {
        let mut index = index();
        index.move_image(1, "archive/kitten.jpeg").unwrap();
        let image = index.metadata_of(1).unwrap();
        assert_eq!(image.name, "kitten");
        assert_eq!(image.extension, "jpeg");
        assert_eq!(image.fingerprint, Some(0));
        assert_eq!(index.image_by_path("archive/kitten.jpeg").unwrap().id, 1);
        assert!(index.image_by_path("photos/cat.jpg").is_none());
        assert!(index.images_with_tag("cat").unwrap().contains(&1));

        assert_eq!(
            index.move_image(2, "archive/kitten.jpeg"),
            Err(LibraryError::DuplicatePath("archive/kitten.jpeg".into()))
        );
    }

    #[test]
    fn test_duplicate_path() {
        let mut index = index();
        assert!(index.insert_image(Image::new(4, "photos/cat.jpg", None)).is_err());
        assert_eq!(index.next_image_id(), 4);
    }

    #[test]
    fn test_drop_tag() {
        let mut index = index();
        index.drop_tag("pet");
        assert!(index.images_with_tag("pet").is_none());
        assert!(!index.tags_of(1).unwrap().contains("pet"));
    }
}
