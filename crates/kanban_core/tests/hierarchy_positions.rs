use kanban_core::db::open_db_in_memory;
use kanban_core::{
    ConfigError, EntityKind, HierarchyApi, HierarchyConfig, HierarchyError, HierarchyStore,
    SiblingSetKey, SqliteHierarchyStore,
};
use std::collections::HashSet;
use uuid::Uuid;

fn api() -> HierarchyApi<SqliteHierarchyStore> {
    api_with(HierarchyConfig::default())
}

fn api_with(config: HierarchyConfig) -> HierarchyApi<SqliteHierarchyStore> {
    let store = SqliteHierarchyStore::try_new(open_db_in_memory().unwrap()).unwrap();
    HierarchyApi::new(store, config).unwrap()
}

fn card_ids(api: &HierarchyApi<SqliteHierarchyStore>, list: Uuid) -> Vec<Uuid> {
    api.list_cards(list)
        .unwrap()
        .into_iter()
        .map(|card| card.uuid)
        .collect()
}

fn assert_unique_positions(api: &HierarchyApi<SqliteHierarchyStore>, key: SiblingSetKey) {
    let positions = api.store().siblings(key).unwrap().positions();
    let distinct: HashSet<i64> = positions.iter().copied().collect();
    assert_eq!(distinct.len(), positions.len(), "duplicate positions in {key}");
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn sequential_creates_get_strictly_increasing_positions() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();

    let positions: Vec<i64> = (0..10)
        .map(|i| {
            api.create_card(list.uuid, &format!("card {i}"), None)
                .unwrap()
                .position
        })
        .collect();

    assert_eq!(positions.first(), Some(&1));
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn move_to_front_renumbers_when_no_gap_is_left() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    let a = api.create_card(list.uuid, "A", None).unwrap();
    let b = api.create_card(list.uuid, "B", None).unwrap();
    let c = api.create_card(list.uuid, "C", None).unwrap();
    assert_eq!((a.position, b.position, c.position), (1, 2, 3));

    let moved = api.move_card(c.uuid, list.uuid, 0).unwrap();

    assert_eq!(card_ids(&api, list.uuid), vec![c.uuid, a.uuid, b.uuid]);
    assert_eq!(moved.position, 1);
    assert_unique_positions(&api, SiblingSetKey::cards_of(list.uuid));
}

#[test]
fn cross_list_move_lands_at_requested_index() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let l1 = api.create_list(board.uuid, "L1").unwrap();
    let l2 = api.create_list(board.uuid, "L2").unwrap();
    let a = api.create_card(l1.uuid, "A", None).unwrap();
    let b = api.create_card(l1.uuid, "B", None).unwrap();
    let c = api.create_card(l2.uuid, "C", None).unwrap();

    let moved = api.move_card(a.uuid, l2.uuid, 1).unwrap();

    assert_eq!(moved.list_uuid, l2.uuid);
    assert_eq!(card_ids(&api, l1.uuid), vec![b.uuid]);
    assert_eq!(card_ids(&api, l2.uuid), vec![c.uuid, a.uuid]);
    assert_unique_positions(&api, SiblingSetKey::cards_of(l1.uuid));
    assert_unique_positions(&api, SiblingSetKey::cards_of(l2.uuid));
}

#[test]
fn moved_card_reads_back_at_every_target_index() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    let cards: Vec<Uuid> = (0..5)
        .map(|i| api.create_card(list.uuid, &format!("{i}"), None).unwrap().uuid)
        .collect();

    for (step, target) in [4_i64, 0, 2, 3, 1, 0, 4].into_iter().enumerate() {
        let mover = cards[step % cards.len()];
        api.move_card(mover, list.uuid, target).unwrap();

        let order = card_ids(&api, list.uuid);
        assert_eq!(order[target as usize], mover, "step {step}");
        assert_unique_positions(&api, SiblingSetKey::cards_of(list.uuid));
    }
}

#[test]
fn target_index_is_clamped_into_range() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    let a = api.create_card(list.uuid, "A", None).unwrap();
    let b = api.create_card(list.uuid, "B", None).unwrap();

    api.move_card(a.uuid, list.uuid, 99).unwrap();
    assert_eq!(card_ids(&api, list.uuid), vec![b.uuid, a.uuid]);

    api.move_card(a.uuid, list.uuid, -3).unwrap();
    assert_eq!(card_ids(&api, list.uuid), vec![a.uuid, b.uuid]);
}

#[test]
fn repeated_front_inserts_survive_gap_exhaustion() {
    let api = api_with(HierarchyConfig {
        renumber_stride: 4,
        ..HierarchyConfig::default()
    });
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    let mut expected = Vec::new();
    for i in 0..6 {
        expected.push(api.create_card(list.uuid, &format!("{i}"), None).unwrap().uuid);
    }

    // Moving the last card to the front halves the leading gap every time.
    for _ in 0..12 {
        let last = *expected.last().unwrap();
        api.move_card(last, list.uuid, 0).unwrap();
        expected.rotate_right(1);

        assert_eq!(card_ids(&api, list.uuid), expected);
        assert_unique_positions(&api, SiblingSetKey::cards_of(list.uuid));
    }
    assert!(api.integrity_report().unwrap().is_empty());
}

#[test]
fn deleted_positions_are_not_reused_until_renumbered() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    api.create_card(list.uuid, "A", None).unwrap();
    let b = api.create_card(list.uuid, "B", None).unwrap();
    let c = api.create_card(list.uuid, "C", None).unwrap();

    api.delete_card(c.uuid).unwrap();
    api.delete_card(b.uuid).unwrap();
    let d = api.create_card(list.uuid, "D", None).unwrap();
    assert_eq!(d.position, 4);

    assert_eq!(api.renumber_set(SiblingSetKey::cards_of(list.uuid)).unwrap(), 2);
    let e = api.create_card(list.uuid, "E", None).unwrap();
    assert_eq!(e.position, 3);
}

#[test]
fn create_list_on_missing_board_is_not_found_and_persists_nothing() {
    let api = api();
    let missing = Uuid::new_v4();

    let err = api.create_list(missing, "X").unwrap_err();

    assert!(matches!(err, HierarchyError::NotFound { kind: "board", uuid } if uuid == missing));
    assert!(api
        .store()
        .siblings(SiblingSetKey::lists_of(missing))
        .unwrap()
        .is_empty());
    assert_eq!(api.statistics().unwrap().total_lists, 0);
}

#[test]
fn create_card_on_missing_list_is_not_found() {
    let api = api();
    let err = api.create_card(Uuid::new_v4(), "X", None).unwrap_err();
    assert!(matches!(err, HierarchyError::NotFound { kind: "list", .. }));
}

#[test]
fn move_to_missing_list_leaves_card_in_place() {
    let api = api();
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    let card = api.create_card(list.uuid, "A", None).unwrap();

    let err = api.move_card(card.uuid, Uuid::new_v4(), 0).unwrap_err();

    assert!(matches!(err, HierarchyError::NotFound { kind: "list", .. }));
    assert_eq!(api.get_card(card.uuid).unwrap(), card);
}

#[test]
fn list_moves_between_boards() {
    let api = api();
    let owner = Uuid::new_v4();
    let first = api.create_board(owner, "First", None).unwrap();
    let second = api.create_board(owner, "Second", None).unwrap();
    let todo = api.create_list(first.uuid, "Todo").unwrap();
    let done = api.create_list(second.uuid, "Done").unwrap();
    let card = api.create_card(todo.uuid, "Ship", None).unwrap();

    let moved = api.move_list(todo.uuid, second.uuid, 0).unwrap();

    assert_eq!(moved.board_uuid, second.uuid);
    let lists: Vec<Uuid> = api
        .list_lists(second.uuid)
        .unwrap()
        .into_iter()
        .map(|list| list.uuid)
        .collect();
    assert_eq!(lists, vec![todo.uuid, done.uuid]);
    assert!(api.list_lists(first.uuid).unwrap().is_empty());
    // Cards travel with their list.
    assert_eq!(api.get_card(card.uuid).unwrap().list_uuid, todo.uuid);
}

#[test]
fn boards_reorder_within_their_owner() {
    let api = api();
    let owner = Uuid::new_v4();
    let a = api.create_board(owner, "A", None).unwrap();
    let b = api.create_board(owner, "B", None).unwrap();
    let c = api.create_board(owner, "C", None).unwrap();
    let other = api.create_board(Uuid::new_v4(), "Other", None).unwrap();
    assert_eq!(other.position, 1);

    api.reorder_board(a.uuid, 2).unwrap();

    let order: Vec<Uuid> = api
        .list_boards(owner)
        .unwrap()
        .into_iter()
        .map(|board| board.uuid)
        .collect();
    assert_eq!(order, vec![b.uuid, c.uuid, a.uuid]);
}

#[test]
fn default_list_is_created_with_new_board() {
    let api = api_with(HierarchyConfig {
        default_list_title: Some("My First List".to_string()),
        ..HierarchyConfig::default()
    });
    let board = api.create_board(Uuid::new_v4(), "Sprint", None).unwrap();

    let lists = api.list_lists(board.uuid).unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].title, "My First List");
    assert_eq!(lists[0].position, 1);

    let next = api.create_list(board.uuid, "Doing").unwrap();
    assert_eq!(next.position, 2);
}

#[test]
fn default_list_title_over_the_title_limit_never_creates_a_board() {
    let store = SqliteHierarchyStore::try_new(open_db_in_memory().unwrap()).unwrap();
    let config = HierarchyConfig {
        max_title_chars: 5,
        default_list_title: Some("Backlog items".to_string()),
        ..HierarchyConfig::default()
    };

    let err = HierarchyApi::new(store, config).err().unwrap();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn updates_validate_titles_and_clear_descriptions() {
    let api = api_with(HierarchyConfig {
        max_title_chars: 8,
        ..HierarchyConfig::default()
    });
    let board = api
        .create_board(Uuid::new_v4(), "  Sprint ", Some("goals"))
        .unwrap();
    assert_eq!(board.title, "Sprint");
    assert_eq!(board.description.as_deref(), Some("goals"));

    let err = api.update_board(board.uuid, Some("   "), None).unwrap_err();
    assert!(matches!(err, HierarchyError::InvalidArgument(_)));
    let err = api
        .update_board(board.uuid, Some("far too long"), None)
        .unwrap_err();
    assert!(matches!(err, HierarchyError::InvalidArgument(_)));

    let updated = api.update_board(board.uuid, None, Some("")).unwrap();
    assert_eq!(updated.title, "Sprint");
    assert_eq!(updated.description, None);

    let list = api.create_list(board.uuid, "Todo").unwrap();
    let renamed = api.update_list(list.uuid, Some("Doing")).unwrap();
    assert_eq!(renamed.title, "Doing");
    assert_eq!(renamed.position, list.position);

    let card = api.create_card(list.uuid, "Task", None).unwrap();
    let card = api.update_card(card.uuid, None, Some("details")).unwrap();
    assert_eq!(card.title, "Task");
    assert_eq!(card.description.as_deref(), Some("details"));
}

#[test]
fn get_of_missing_entities_is_not_found() {
    let api = api();
    let id = Uuid::new_v4();
    assert!(matches!(
        api.get_board(id),
        Err(HierarchyError::NotFound { kind: "board", .. })
    ));
    assert!(matches!(
        api.get_list(id),
        Err(HierarchyError::NotFound { kind: "list", .. })
    ));
    assert!(matches!(
        api.get_card(id),
        Err(HierarchyError::NotFound { kind: "card", .. })
    ));
    assert!(matches!(
        api.delete_card(id),
        Err(HierarchyError::NotFound { kind: "card", .. })
    ));
}

#[test]
fn renumber_all_compacts_every_set() {
    let api = api();
    let owner = Uuid::new_v4();
    let board = api.create_board(owner, "Sprint", None).unwrap();
    let list = api.create_list(board.uuid, "Todo").unwrap();
    let cards: Vec<Uuid> = (0..4)
        .map(|i| api.create_card(list.uuid, &format!("{i}"), None).unwrap().uuid)
        .collect();
    api.delete_card(cards[1]).unwrap();

    // Boards of the owner, lists of the board, cards of the list.
    assert_eq!(api.renumber_all().unwrap(), 3);

    let set = api
        .store()
        .siblings(SiblingSetKey::cards_of(list.uuid))
        .unwrap();
    assert_eq!(set.ids(), vec![cards[0], cards[2], cards[3]]);
    assert_eq!(set.positions(), vec![1, 2, 3]);
    assert_eq!(
        api.store().get_entry(EntityKind::Board, board.uuid).unwrap().unwrap().position,
        1
    );
}
