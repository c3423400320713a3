//! Groupie Trackers dataset

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    cache::{DATASET_TTL, TtlCache},
    cl::{ArtistFilter, ProviderName},
    http::{FetchError, HttpClient, LISTING_TIMEOUT, Transport, static_url},
    model::{ArtistRecord, ReleaseRecord, TrackRecord},
    source::{Provider, normalize, numeric_id},
};

/// Full artist list
const ARTISTS_URL: &str = "https://groupietrackers.herokuapp.com/api/artists";
/// Concert locations and dates of all artists
const RELATION_URL: &str = "https://groupietrackers.herokuapp.com/api/relation";

/// Dataset artist
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
#[expect(clippy::module_name_repetitions)]
pub struct GroupieArtist {
    /// Identifier
    pub id: u64,
    /// Picture URL
    #[serde(default)]
    pub image: String,
    /// Group name
    pub name: String,
    /// Member names
    #[serde(default)]
    pub members: Vec<String>,
    /// Year the group was created
    #[serde(default)]
    pub creation_date: i32,
    /// First album date, as `DD-MM-YYYY`
    #[serde(default)]
    pub first_album: String,
}

impl GroupieArtist {
    fn to_record(&self) -> ArtistRecord {
        ArtistRecord {
            id: self.id.to_string(),
            display_name: self.name.clone(),
            image_url: self.image.clone(),
            meta_line: format!(
                "Created {} • {} members",
                self.creation_date,
                self.members.len()
            ),
            provider: ProviderName::Groupie,
        }
    }

    /// Return true if name or one of the members contains normalized query
    fn matches(&self, nquery: &str) -> bool {
        nquery.is_empty()
            || normalize(&self.name).contains(nquery)
            || self.members.iter().any(|m| normalize(m).contains(nquery))
    }
}

/// Concert locations of one artist
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Artist identifier
    pub id: u64,
    /// Concert dates by location key
    #[serde(default)]
    pub dates_locations: BTreeMap<String, Vec<String>>,
}

/// Relations of all artists
#[derive(Clone, Debug, serde::Deserialize)]
pub(crate) struct RelationIndex {
    pub(crate) index: Vec<Relation>,
}

/// Groupie Trackers provider
pub(crate) struct Groupie {
    http: HttpClient,
    artists: TtlCache<Arc<Vec<GroupieArtist>>>,
    relations: TtlCache<Arc<RelationIndex>>,
}

impl Groupie {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            http: HttpClient::new(transport, "groupie", LISTING_TIMEOUT, None),
            artists: TtlCache::new("groupie artists", DATASET_TTL),
            relations: TtlCache::new("groupie relations", DATASET_TTL),
        }
    }

    /// Get all artists of the dataset
    pub(crate) async fn artists(&self) -> Result<Arc<Vec<GroupieArtist>>, FetchError> {
        self.artists
            .get_or_fetch(|| async {
                let artists: Vec<GroupieArtist> =
                    self.http.get_json(static_url(ARTISTS_URL)).await?;
                if artists.is_empty() {
                    return Err(FetchError::Upstream("empty Groupie artist list".to_owned()));
                }
                Ok(Arc::new(artists))
            })
            .await
    }

    /// Get relations of all artists
    pub(crate) async fn relations(&self) -> Result<Arc<RelationIndex>, FetchError> {
        self.relations
            .get_or_fetch(|| async {
                let relations: RelationIndex =
                    self.http.get_json(static_url(RELATION_URL)).await?;
                if relations.index.is_empty() {
                    return Err(FetchError::Upstream(
                        "empty Groupie relation index".to_owned(),
                    ));
                }
                Ok(Arc::new(relations))
            })
            .await
    }

    /// Get concert locations of an artist
    pub(crate) async fn relation_for(&self, id: &str) -> Result<Relation, FetchError> {
        let id = numeric_id(ProviderName::Groupie, id)?;
        self.relations()
            .await?
            .index
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("no Groupie relation for artist {id}")))
    }

    /// Search artists by name or member, then apply dataset filters
    pub(crate) async fn browse(
        &self,
        query: &str,
        filter: &ArtistFilter,
    ) -> Result<Vec<ArtistRecord>, FetchError> {
        let nquery = normalize(query);
        Ok(self
            .artists()
            .await?
            .iter()
            .filter(|a| a.matches(&nquery))
            .filter(|a| filter.matches(a.creation_date, a.members.len()))
            .map(GroupieArtist::to_record)
            .collect())
    }
}

#[async_trait::async_trait]
impl Provider for Groupie {
    /// The dataset is searched locally, a zero limit returns all matches
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArtistRecord>, FetchError> {
        let mut artists = self.browse(query, &ArtistFilter::default()).await?;
        if limit > 0 {
            artists.truncate(limit);
        }
        Ok(artists)
    }

    async fn get_by_id(&self, id: &str) -> Result<ArtistRecord, FetchError> {
        let nid = numeric_id(ProviderName::Groupie, id)?;
        self.artists()
            .await?
            .iter()
            .find(|a| a.id == nid)
            .map(GroupieArtist::to_record)
            .ok_or_else(|| FetchError::NotFound(format!("no Groupie artist with id {nid}")))
    }

    async fn top_tracks(&self, _id: &str, _limit: usize) -> Result<Vec<TrackRecord>, FetchError> {
        Ok(Vec::new())
    }

    async fn latest_releases(
        &self,
        _id: &str,
        _limit: usize,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        Ok(Vec::new())
    }

    fn name(&self) -> ProviderName {
        ProviderName::Groupie
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{http::testing::FakeTransport, source::tests::fake};

    pub(crate) const ARTISTS: &str = r#"[
        {"id": 1, "image": "https://img/queen.jpeg", "name": "Queen",
         "members": ["Freddie Mercury", "Brian May", "John Deacon", "Roger Meddows-Taylor"],
         "creationDate": 1970, "firstAlbum": "14-12-1973", "locations": "x"},
        {"id": 2, "image": "https://img/soja.jpeg", "name": "SOJA",
         "members": ["Jacob Hemphill", "Bob Jefferson"],
         "creationDate": 1997, "firstAlbum": "05-06-2002"},
        {"id": 3, "image": "https://img/beyonce.jpeg", "name": "Beyoncé",
         "members": ["Beyoncé Knowles"], "creationDate": 2003, "firstAlbum": "24-06-2003"}
    ]"#;

    pub(crate) const RELATIONS: &str = r#"{"index": [
        {"id": 1, "datesLocations": {
            "los_angeles-usa": ["12-01-2020"],
            "lyon-france": ["03-02-2020", "04-02-2020"]}},
        {"id": 2, "datesLocations": {"london-uk": ["01-01-2021"]}}
    ]}"#;

    pub(crate) fn routes(fake: &FakeTransport) {
        fake.route("/api/artists", 200, ARTISTS);
        fake.route("/api/relation", 200, RELATIONS);
    }

    #[tokio::test]
    async fn search_by_name_or_member() {
        let (fake, transport) = fake();
        routes(&fake);
        let groupie = Groupie::new(transport);

        let all = groupie.search("", 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].meta_line, "Created 1970 • 4 members");
        assert_eq!(all[0].image_url, "https://img/queen.jpeg");

        let by_member = groupie.search("brian", 30).await.unwrap();
        assert_eq!(by_member.len(), 1);
        assert_eq!(by_member[0].display_name, "Queen");

        let accents = groupie.search("BEYONCE", 30).await.unwrap();
        assert_eq!(accents.len(), 1);

        assert_eq!(groupie.search("", 2).await.unwrap().len(), 2);
        assert!(groupie.search("zzz", 30).await.unwrap().is_empty());

        // list fetched once
        assert_eq!(fake.count("/api/artists"), 1);
    }

    #[tokio::test]
    async fn browse_with_filter() {
        let (fake, transport) = fake();
        routes(&fake);
        let groupie = Groupie::new(transport);
        let filter = ArtistFilter {
            year_min: Some(1990),
            year_max: None,
            members: vec![2],
        };
        let artists = groupie.browse("", &filter).await.unwrap();
        let names: Vec<_> = artists.iter().map(|a| a.display_name.as_str()).collect();
        assert_eq!(names, ["SOJA"]);
    }

    #[tokio::test]
    async fn get_by_id() {
        let (fake, transport) = fake();
        routes(&fake);
        let groupie = Groupie::new(transport);

        assert_eq!(groupie.get_by_id("2").await.unwrap().display_name, "SOJA");
        assert!(groupie.get_by_id("99").await.unwrap_err().is_not_found());

        let requests = fake.requests().len();
        assert!(groupie.get_by_id("abc").await.unwrap_err().is_not_found());
        assert_eq!(fake.requests().len(), requests);

        assert!(groupie.top_tracks("1", 10).await.unwrap().is_empty());
        assert!(groupie.latest_releases("1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relations() {
        let (fake, transport) = fake();
        routes(&fake);
        let groupie = Groupie::new(transport);

        let relation = groupie.relation_for("1").await.unwrap();
        assert_eq!(
            relation.dates_locations.keys().collect::<Vec<_>>(),
            ["los_angeles-usa", "lyon-france"]
        );
        assert!(groupie.relation_for("3").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn upstream_failure_without_cache() {
        let (fake, transport) = fake();
        fake.route("/api/artists", 500, "oops");
        let groupie = Groupie::new(transport);
        let err = groupie.search("", 0).await.unwrap_err();
        assert!(err.is_transient());

        fake.route("/api/artists", 200, "[]");
        assert!(matches!(
            groupie.search("", 0).await.unwrap_err(),
            FetchError::Upstream(_)
        ));
    }
}
