use std::collections::HashSet;

use crate::models::Channel;
use crate::services::normalizer::{is_meaningful_name, normalize_name, normalize_url};

/// Drop channels whose normalized link or meaningful normalized name was
/// already seen, preserving source order among survivors.
///
/// When a name collision evicts a channel, its link key is rolled back out of
/// the link set: the colliding entry must not shadow a later channel that
/// legitimately reuses the same URL under a different name. The first
/// insertion stays canonical.
pub fn remove_duplicates(channels: Vec<Channel>) -> (Vec<Channel>, usize) {
    let mut seen_links: HashSet<String> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut unique: Vec<Channel> = Vec::with_capacity(channels.len());
    let mut removed = 0usize;

    for channel in channels {
        let link_key = normalize_url(&channel.link);
        if seen_links.contains(&link_key) {
            removed += 1;
            continue;
        }
        seen_links.insert(link_key.clone());

        let name_key = normalize_name(&channel.name);
        if is_meaningful_name(&name_key) {
            if seen_names.contains(&name_key) {
                removed += 1;
                seen_links.remove(&link_key);
                continue;
            }
            seen_names.insert(name_key);
        }

        unique.push(channel);
    }

    for (id, channel) in unique.iter_mut().enumerate() {
        channel.id = id;
    }

    (unique, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: usize, name: &str, link: &str) -> Channel {
        Channel::new(id, name, link)
    }

    #[test]
    fn drops_normalized_url_duplicates() {
        let input = vec![
            channel(0, "Alpha", "http://h/ch?utm_source=x&a=1"),
            channel(1, "Beta", "http://h/ch/?a=1"),
        ];
        let (unique, removed) = remove_duplicates(input);
        assert_eq!(unique.len(), 1);
        assert_eq!(removed, 1);
        assert_eq!(unique[0].name, "Alpha");
    }

    #[test]
    fn drops_meaningful_name_collisions() {
        let input = vec![
            channel(0, "BBC One HD", "http://h/one"),
            channel(1, "bbc one", "http://h/two"),
        ];
        let (unique, removed) = remove_duplicates(input);
        assert_eq!(unique.len(), 1);
        assert_eq!(removed, 1);
        assert_eq!(unique[0].link, "http://h/one");
    }

    #[test]
    fn generic_names_never_collide() {
        let input = vec![
            channel(0, "TV", "http://h/one"),
            channel(1, "TV", "http://h/two"),
        ];
        let (unique, removed) = remove_duplicates(input);
        assert_eq!(unique.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn name_collision_rolls_back_link_key() {
        // The second channel loses on name; its link key must not block the
        // third channel, which shares that link but carries a distinct name.
        let input = vec![
            channel(0, "Sky Sports F1", "http://h/a"),
            channel(1, "Sky Sports F1 HD", "http://h/b"),
            channel(2, "Movie Central", "http://h/b"),
        ];
        let (unique, removed) = remove_duplicates(input);
        assert_eq!(removed, 1);
        let names: Vec<&str> = unique.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Sky Sports F1", "Movie Central"]);
    }

    #[test]
    fn is_idempotent() {
        let input = vec![
            channel(0, "Alpha News", "http://h/a"),
            channel(1, "alpha news", "http://h/a2"),
            channel(2, "Beta Movies", "http://h/b"),
        ];
        let (once, _) = remove_duplicates(input);
        let (twice, removed) = remove_duplicates(once.clone());
        assert_eq!(once, twice);
        assert_eq!(removed, 0);
    }

    #[test]
    fn preserves_order_and_reindexes() {
        let input = vec![
            channel(0, "Alpha News", "http://h/a"),
            channel(1, "Alpha News", "http://h/dup"),
            channel(2, "Beta Movies", "http://h/b"),
            channel(3, "Gamma Kids", "http://h/c"),
        ];
        let (unique, removed) = remove_duplicates(input);
        assert_eq!(removed, 1);
        let ids: Vec<usize> = unique.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        let names: Vec<&str> = unique.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha News", "Beta Movies", "Gamma Kids"]);
    }
}
