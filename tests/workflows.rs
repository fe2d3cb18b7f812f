//! End-to-end workflow tests against a temp wiki backed by a real git repo.

use std::io::Cursor;

use tempfile::TempDir;

use mycelium::config::Config;
use mycelium::hyphae::{ExistingHypha, Hypha};
use mycelium::ops;
use mycelium::users::User;
use mycelium::wiki::Wiki;

struct TestWiki {
    wiki: Wiki,
    _dir: TempDir,
}

impl TestWiki {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create wiki dir");
        let wiki = Wiki::open(dir.path(), Config::default()).expect("failed to open wiki");
        Self { wiki, _dir: dir }
    }

    fn admin(&self) -> User {
        User::wikimind()
    }

    fn upload(&self, name: &str, text: &str) {
        let hypha = self.wiki.index.by_name(name);
        ops::upload_text(&self.wiki, &hypha, text, "", &self.admin()).expect("upload text");
    }

    fn text_of(&self, name: &str) -> String {
        self.wiki
            .index
            .by_name(name)
            .text(&*self.wiki.history)
            .expect("read text")
    }

    fn commit_count(&self) -> usize {
        self.wiki.history.recent_changes_stream().count()
    }

    fn existing_names(&self) -> Vec<String> {
        self.wiki
            .index
            .existing_hyphae()
            .iter()
            .map(|h| h.canonical_name().to_string())
            .collect()
    }
}

#[test]
fn create_link_rename_redirect() {
    let t = TestWiki::new();
    t.upload("alpha", "=> beta\n");
    t.upload("beta", "hello\n");
    assert_eq!(t.wiki.index.backlinks_for("beta"), vec!["alpha"]);

    let alpha = t.wiki.index.by_name("alpha");
    ops::rename(&t.wiki, &alpha, "gamma", false, true, &t.admin()).expect("rename");

    assert_eq!(t.text_of("gamma"), "=> beta\n");
    assert_eq!(t.wiki.index.backlinks_for("beta"), vec!["gamma"]);

    let alpha = t.wiki.index.by_name("alpha");
    assert!(matches!(
        alpha,
        Hypha::Existing(ExistingHypha::Textual { .. })
    ));
    assert_eq!(t.text_of("alpha"), "=> gamma | 👁️➡️ Gamma\n<= gamma | full\n");
    assert_eq!(
        t.wiki.categories.hyphae_in_category("redirection"),
        vec!["alpha"]
    );
    // The redirection links back to gamma.
    let mut backlinks = t.wiki.index.backlinks_for("gamma");
    backlinks.sort();
    assert_eq!(backlinks, vec!["alpha"]);
}

#[test]
fn recursive_delete_removes_the_subtree() {
    let t = TestWiki::new();
    for name in ["a", "a/b", "a/b/c", "a2"] {
        t.upload(name, &format!("body of {name}\n"));
    }
    let a = t.wiki.index.by_name("a");
    ops::delete(&t.wiki, &t.admin(), &a, true).expect("recursive delete");

    assert_eq!(t.existing_names(), vec!["a2"]);
    let root = t.wiki.history.hyphae_dir();
    assert!(!root.join("a.myco").exists());
    assert!(!root.join("a/b.myco").exists());
    assert!(!root.join("a/b/c.myco").exists());
    assert!(root.join("a2.myco").exists());
}

#[test]
fn delete_of_nothing_is_an_empty_operation() {
    let t = TestWiki::new();
    let ghost = t.wiki.index.by_name("ghost");
    let before = t.commit_count();
    assert!(matches!(
        ops::delete(&t.wiki, &t.admin(), &ghost, false),
        Err(ops::OpsError::EmptyOperation)
    ));
    assert_eq!(t.commit_count(), before);
}

#[test]
fn revert_restores_an_earlier_body() {
    let t = TestWiki::new();
    t.upload("x", "one\n");
    t.upload("x", "two\n");
    let revs = t.wiki.history.revisions("x").expect("revisions");
    assert_eq!(revs.len(), 2);
    let first = revs.last().unwrap().hash.clone();

    let x = t.wiki.index.by_name("x");
    ops::revert(&t.wiki, &t.admin(), &x, &first).expect("revert");
    assert_eq!(t.text_of("x"), "one\n");

    let head = &t.wiki.history.recent_changes(1).expect("log")[0];
    assert_eq!(head.message, format!("Revert ‘x’ to revision {first}"));

    // Reverting the reverted hypha to the same revision changes nothing and
    // commits nothing.
    let before = t.commit_count();
    let x = t.wiki.index.by_name("x");
    ops::revert(&t.wiki, &t.admin(), &x, &first).expect("second revert");
    assert_eq!(t.commit_count(), before);
    assert_eq!(t.text_of("x"), "one\n");
}

#[test]
fn revert_to_before_creation_deletes() {
    let t = TestWiki::new();
    t.upload("anchor", "first\n");
    t.upload("doomed", "body\n");
    t.wiki
        .categories
        .add_hyphae_to_category("stuff", &["doomed".to_string()]);
    let revs = t.wiki.history.recent_changes(10).expect("log");
    let before_doomed = revs.last().unwrap().hash.clone();

    let doomed = t.wiki.index.by_name("doomed");
    ops::revert(&t.wiki, &t.admin(), &doomed, &before_doomed).expect("revert");
    assert!(t.wiki.index.by_name("doomed").is_empty());
    assert!(t.wiki.categories.categories_with_hypha("doomed").is_empty());
}

#[test]
fn rename_collision_leaves_everything_alone() {
    let t = TestWiki::new();
    t.upload("a", "a\n");
    t.upload("b", "b\n");
    let before = t.commit_count();

    let a = t.wiki.index.by_name("a");
    let err = ops::rename(&t.wiki, &a, "b", false, false, &t.admin()).unwrap_err();
    assert!(matches!(err, ops::OpsError::NameTaken { .. }));
    assert_eq!(t.commit_count(), before);
    assert_eq!(t.existing_names(), vec!["a", "b"]);
}

#[test]
fn rename_to_self_is_a_noop() {
    let t = TestWiki::new();
    t.upload("same", "body\n");
    let before = t.commit_count();
    let h = t.wiki.index.by_name("same");
    ops::rename(&t.wiki, &h, "same", false, false, &t.admin()).expect("no-op rename");
    assert_eq!(t.commit_count(), before);
}

#[test]
fn recursive_rename_moves_the_subtree() {
    let t = TestWiki::new();
    t.upload("tree", "=> tree/leaf\n");
    t.upload("tree/leaf", "green\n");
    let tree = t.wiki.index.by_name("tree");
    ops::rename(&t.wiki, &tree, "bush", true, false, &t.admin()).expect("rename");

    assert_eq!(t.existing_names(), vec!["bush", "bush/leaf"]);
    assert_eq!(t.text_of("bush/leaf"), "green\n");
    assert_eq!(t.wiki.index.backlinks_for("tree/leaf"), vec!["bush"]);
    let head = &t.wiki.history.recent_changes(1).expect("log")[0];
    assert_eq!(head.message, "Rename ‘tree’ to ‘bush’ recursively");
}

#[test]
fn unchanged_text_upload_commits_nothing() {
    let t = TestWiki::new();
    t.upload("still", "same text\n");
    let before = t.commit_count();
    t.upload("still", "same text\n");
    assert_eq!(t.commit_count(), before);
}

#[test]
fn invalid_names_are_rejected() {
    let t = TestWiki::new();
    let bad = t.wiki.index.by_name("how?");
    assert!(matches!(
        ops::upload_text(&t.wiki, &bad, "x", "", &t.admin()),
        Err(ops::OpsError::InvalidName { .. })
    ));
}

#[test]
fn media_upload_and_removal() {
    let t = TestWiki::new();
    t.upload("pic", "caption\n");
    let pic = t.wiki.index.by_name("pic");
    let mut data = Cursor::new(b"\x89PNG fake".to_vec());
    ops::upload_binary(&t.wiki, &pic, "shot.png", "image/png", &mut data, &t.admin())
        .expect("upload media");

    let pic = t.wiki.index.by_name("pic");
    let Hypha::Existing(existing @ ExistingHypha::Media { .. }) = pic else {
        panic!("pic should be a media hypha");
    };
    assert!(t.wiki.history.hyphae_dir().join("pic.png").exists());

    ops::remove_media(&t.wiki, &t.admin(), &existing).expect("remove media");
    let pic = t.wiki.index.by_name("pic");
    assert!(matches!(pic, Hypha::Existing(ExistingHypha::Textual { .. })));
    assert!(!t.wiki.history.hyphae_dir().join("pic.png").exists());
    assert_eq!(t.text_of("pic"), "caption\n");
}

#[test]
fn media_only_hypha_dies_with_its_media() {
    let t = TestWiki::new();
    let fresh = t.wiki.index.by_name("photo");
    let mut data = Cursor::new(b"jpeg bytes".to_vec());
    ops::upload_binary(&t.wiki, &fresh, "x.jpg", "image/jpeg", &mut data, &t.admin())
        .expect("upload media");
    assert!(!t.wiki.index.by_name("photo").is_empty());

    let Hypha::Existing(existing) = t.wiki.index.by_name("photo") else {
        panic!("photo should exist");
    };
    ops::remove_media(&t.wiki, &t.admin(), &existing).expect("remove media");
    assert!(t.wiki.index.by_name("photo").is_empty());
}

#[test]
fn empty_media_upload_is_rejected() {
    let t = TestWiki::new();
    let fresh = t.wiki.index.by_name("void");
    let mut data = Cursor::new(Vec::new());
    assert!(matches!(
        ops::upload_binary(&t.wiki, &fresh, "x.png", "image/png", &mut data, &t.admin()),
        Err(ops::OpsError::NoMediaData)
    ));
    assert!(t.wiki.index.by_name("void").is_empty());
}

#[test]
fn delete_then_recreate_clears_categories() {
    let t = TestWiki::new();
    t.upload("h", "body\n");
    t.wiki
        .categories
        .add_hyphae_to_category("c", &["h".to_string()]);
    let h = t.wiki.index.by_name("h");
    ops::delete(&t.wiki, &t.admin(), &h, false).expect("delete");
    t.upload("h", "born again\n");
    assert!(t.wiki.categories.categories_with_hypha("h").is_empty());
}

#[test]
fn full_text_search_finds_bodies() {
    let t = TestWiki::new();
    t.upload("findme", "a peculiar phrase lives here\n");
    t.upload("other", "nothing of note\n");
    let results = t
        .wiki
        .full_text_search("Peculiar Phrase", 10)
        .expect("search");
    assert_eq!(results.hyphae.len(), 1);
    assert_eq!(results.hyphae[0].hypha, "findme");
    assert!(results.complete);
}

#[test]
fn title_search_matches_names() {
    let t = TestWiki::new();
    t.upload("garden/apple", "x\n");
    t.upload("garden/pear", "x\n");
    t.upload("cellar", "x\n");
    assert_eq!(
        t.wiki.title_search("garden"),
        vec!["garden/apple", "garden/pear"]
    );
}

#[test]
fn reindex_matches_incremental_state() {
    let t = TestWiki::new();
    t.upload("one", "=> two\n");
    t.upload("two", "x\n");
    let names_before = t.existing_names();
    let backlinks_before = t.wiki.index.backlinks_for("two");

    t.wiki.reindex().expect("reindex");
    assert_eq!(t.existing_names(), names_before);
    assert_eq!(t.wiki.index.backlinks_for("two"), backlinks_before);
}

#[test]
fn header_links_follow_their_hypha() {
    let t = TestWiki::new();
    let defaults = t.wiki.headers.default_links();
    assert_eq!(t.wiki.headers.links(), defaults);

    t.upload("header_links", "=> home | Home\n=> list | Everything\n");
    let links = t.wiki.headers.links();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].display, "Home");

    let h = t.wiki.index.by_name("header_links");
    ops::delete(&t.wiki, &t.admin(), &h, false).expect("delete");
    assert_eq!(t.wiki.headers.links(), defaults);
}

#[test]
fn subhypha_tree_renders_with_siblings() {
    let t = TestWiki::new();
    for name in ["t", "t/a", "t/b", "t/b/deep", "t/c"] {
        t.upload(name, "x\n");
    }
    let (html, prev, next) = t.wiki.subhyphae_tree(&t.wiki.index.by_name("t/b"));
    assert!(html.contains("/hypha/t/b/deep"));
    assert_eq!(prev, "t/a");
    assert_eq!(next, "t/c");

    assert_eq!(t.wiki.index.backlinks_count("t/a"), 0);
    assert!(t.wiki.index.random().is_some());
    let orphans = t.wiki.index.orphans();
    assert_eq!(orphans.len(), 5);
}

#[test]
fn wikimind_commits_carry_the_author_identity() {
    let t = TestWiki::new();
    t.upload("signed", "text\n");
    let head = &t.wiki.history.recent_changes(1).expect("log")[0];
    assert_eq!(head.username, "wikimind");
    assert_eq!(head.message, "Create ‘signed’");
}
