use aspects_core::db::open_db_in_memory;
use aspects_core::{
    AspectData, AspectId, AspectNode, AspectPropertyData, AspectPropertyNode, AspectRepository,
    AspectService, AspectServiceError, PropertyCardinality, SqliteAspectRepository,
};
use rusqlite::Connection;

#[test]
fn stale_aspect_version_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let id = service.save(&value_aspect("Height")).unwrap();

    // First writer wins and bumps the version.
    let mut winner = update_of(&conn, &service, id);
    winner.description = Some("first".to_string());
    service.save(&winner).unwrap();

    // Second writer still holds the pre-bump snapshot.
    let mut loser = winner.clone();
    loser.description = Some("second".to_string());
    let err = service.save(&loser).unwrap_err();
    assert!(matches!(
        err,
        AspectServiceError::ConcurrentModification { id: conflicted, .. } if conflicted == id
    ));
}

#[test]
fn concurrently_added_property_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let part = service.save(&value_aspect("Part")).unwrap();
    let id = service.save(&value_aspect("Owner")).unwrap();
    let snapshot = update_of(&conn, &service, id);

    let mut winner = snapshot.clone();
    winner.properties.push(AspectPropertyData::initial(
        "part",
        part,
        PropertyCardinality::One,
    ));
    service.save(&winner).unwrap();

    // The stale snapshot does not know about the new property.
    let mut loser = snapshot;
    loser.version += 1;
    let err = service.save(&loser).unwrap_err();
    assert!(matches!(
        err,
        AspectServiceError::ConcurrentModification { detail, .. } if detail.contains("properties")
    ));
}

#[test]
fn concurrently_edited_property_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let repo = SqliteAspectRepository::try_new(&conn).unwrap();

    let part = service.save(&value_aspect("Part")).unwrap();
    let mut data = value_aspect("Owner");
    data.properties.push(AspectPropertyData::initial(
        "part",
        part,
        PropertyCardinality::One,
    ));
    let id = service.save(&data).unwrap();
    let snapshot = update_of(&conn, &service, id);

    let mut winner = snapshot.clone();
    winner.properties[0].cardinality = PropertyCardinality::Infinity;
    service.save(&winner).unwrap();

    // Aspect version is caught up, but the property version is stale.
    let mut loser = snapshot;
    loser.version += 1;
    let err = service.save(&loser).unwrap_err();
    assert!(matches!(
        err,
        AspectServiceError::ConcurrentModification { detail, .. } if detail.contains("properties")
    ));

    let persisted = repo.list_properties(id).unwrap();
    assert_eq!(persisted[0].cardinality, PropertyCardinality::Infinity);
}

#[test]
fn brand_new_properties_do_not_trip_the_version_check() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let repo = SqliteAspectRepository::try_new(&conn).unwrap();

    let part = service.save(&value_aspect("Part")).unwrap();
    let id = service.save(&value_aspect("Owner")).unwrap();

    let mut data = update_of(&conn, &service, id);
    data.properties.push(AspectPropertyData::initial(
        "part",
        part,
        PropertyCardinality::One,
    ));
    service.save(&data).unwrap();

    assert_eq!(repo.list_properties(id).unwrap().len(), 1);
}

#[test]
fn remove_with_stale_version_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let id = service.save(&value_aspect("Height")).unwrap();
    let snapshot = update_of(&conn, &service, id);

    let mut bump = snapshot.clone();
    bump.description = Some("touched".to_string());
    service.save(&bump).unwrap();

    let err = service.remove(&snapshot, false).unwrap_err();
    assert!(matches!(
        err,
        AspectServiceError::ConcurrentModification { .. }
    ));
    service.find_by_id(id).unwrap();
}

fn service(conn: &Connection) -> AspectService<SqliteAspectRepository<'_>> {
    AspectService::new(SqliteAspectRepository::try_new(conn).unwrap())
}

fn value_aspect(name: &str) -> AspectData {
    let mut data = AspectData::initial(name);
    data.base_type = Some("Text".to_string());
    data
}

fn update_of(
    conn: &Connection,
    service: &AspectService<SqliteAspectRepository<'_>>,
    id: AspectId,
) -> AspectData {
    let repo = SqliteAspectRepository::try_new(conn).unwrap();
    let node = service.find_by_id(id).unwrap();
    let persisted = repo.list_properties(id).unwrap();
    update_request(&node, &persisted)
}

fn update_request(node: &AspectNode, persisted: &[AspectPropertyNode]) -> AspectData {
    AspectData {
        id: Some(node.id),
        name: node.name.clone(),
        measure: node.measure.clone(),
        base_type: node.base_type.map(|base_type| base_type.as_str().to_string()),
        properties: persisted
            .iter()
            .map(|property| AspectPropertyData {
                id: Some(property.id),
                name: property.name.clone(),
                target_id: property.target_id,
                cardinality: property.cardinality,
                version: property.version,
                deleted: false,
            })
            .collect(),
        version: node.version,
        subject_id: node.subject_id,
        subject_name: node.subject_name.clone(),
        description: node.description.clone(),
    }
}
