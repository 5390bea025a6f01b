use litrev::tools::{EnrichmentConfig, EnrichedPaper};
use litrev::{
    Config, Credentials, EnrichmentCoordinator, MetaSearchClient, NoProgress, Paper, SearchQuery,
    SearchTool, YearFilter,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const ARXIV_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>The dominant sequence transduction models.</summary>
    <author><name>Ashish Vaswani</name></author>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2005.14165v4</id>
    <published>2020-05-28T17:29:03Z</published>
    <title>Language Models are Few-Shot Learners</title>
    <summary>Scaling up language models.</summary>
    <author><name>Tom B. Brown</name></author>
  </entry>
</feed>"#;

const DBLP_PUBLICATIONS: &str = r#"{"result":{"hits":{"@total":"2","hit":[
    {"info":{"key":"conf/nips/VaswaniSPUJGKP17","title":"Attention is All you Need.","year":"2017",
      "type":"Conference and Workshop Papers","venue":"NIPS","ee":"https://proceedings.neurips.cc/paper/7181",
      "authors":{"author":[{"@pid":"1","text":"Ashish Vaswani"},{"@pid":"2","text":"Noam Shazeer"}]}}},
    {"info":{"key":"conf/nips/2017","title":"Advances in Neural Information Processing Systems 30","year":"2017",
      "type":"Editorship"}}
]}}}"#;

fn keyword_query(groups: &[&[&str]], sources: &[&str]) -> SearchQuery {
    SearchQuery {
        keyword_groups: groups
            .iter()
            .map(|g| g.iter().map(|t| (*t).to_string()).collect())
            .collect(),
        sources: sources.iter().map(|s| (*s).to_string()).collect(),
        ..SearchQuery::default()
    }
}

fn client_for(server: &MockServer, credentials: &Credentials) -> MetaSearchClient {
    MetaSearchClient::from_config(&Config::for_testing(&server.uri()), credentials).unwrap()
}

#[tokio::test]
async fn test_arxiv_search_against_mock() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("max_results", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARXIV_FEED))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, &Credentials::default());
    let mut query = keyword_query(&[&["attention"]], &["arXiv"]);
    query.years = Some(YearFilter::Single(2017));

    let result = client.search(&query, &NoProgress).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.papers.len(), 1);
    let paper = &result.papers[0];
    assert_eq!(paper.title, "Attention Is All You Need");
    assert_eq!(paper.year, Some(2017));
    assert_eq!(paper.source, "arXiv");
    assert_eq!(paper.url.as_deref(), Some("http://arxiv.org/pdf/1706.03762v7"));
    assert!(result.query_log["arXiv"].contains("all:\"attention\""));
    assert!(result.query_log["arXiv"].contains("submittedDate:[201701010000 TO 201712312359]"));
}

#[tokio::test]
async fn test_arxiv_http_error_is_contained() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/publ/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DBLP_PUBLICATIONS))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, &Credentials::default());
    let query = keyword_query(&[&["attention"]], &["arXiv", "DBLP"]);
    let result = client.search(&query, &NoProgress).await;

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].source, "arXiv");
    assert_eq!(result.successful_providers, 1);
    assert_eq!(result.papers.len(), 1);
    assert_eq!(result.papers[0].source, "DBLP");
}

#[tokio::test]
async fn test_dblp_author_lookup_and_publications() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/author/api"))
        .and(query_param("q", "Ashish Vaswani"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"result":{"hits":{"@total":"1","hit":[{"info":{"author":"Ashish Vaswani","url":"https://dblp.org/pid/1"}}]}}}"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/publ/api"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DBLP_PUBLICATIONS))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, &Credentials::default());
    let mut query = keyword_query(&[&["attention"]], &["dblp"]);
    query.authors = vec!["Ashish Vaswani".to_string()];

    let result = client.search(&query, &NoProgress).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.papers.len(), 1);
    assert_eq!(result.papers[0].authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
    assert_eq!(result.papers[0].venue.as_deref(), Some("NIPS"));
    assert_eq!(result.query_log["DBLP"], "attention author:Ashish_Vaswani:");
}

#[tokio::test]
async fn test_gated_sources_without_keys_are_skipped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, &Credentials::default());
    let query = keyword_query(&[&["attention"]], &["Scopus", "Google Scholar"]);
    let result = client.search(&query, &NoProgress).await;

    assert!(result.papers.is_empty());
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].source, "Scopus");
    assert_eq!(result.errors[0].message, "SCOPUS_API_KEY is not configured");
    assert_eq!(result.errors[1].message, "SERPAPI_API_KEY is not configured");
    assert_eq!(result.query_log["Scopus"], "");
    assert_eq!(result.query_log["Google Scholar"], "");
}

#[tokio::test]
async fn test_scopus_sends_key_header() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/search/scopus"))
        .and(header("X-ELS-APIKey", "scopus-key"))
        .and(query_param("view", "COMPLETE"))
        .and(query_param("count", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"search-results":{"entry":[
                {"dc:title":"Measuring Cultural Bias","prism:coverDate":"2022-03-01",
                 "prism:publicationName":"Computational Linguistics","dc:creator":"Smith J.",
                 "link":[{"@ref":"scopus","@href":"https://www.scopus.com/record/1"}]}
            ]}}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let credentials = Credentials {
        scopus_api_key: Some("scopus-key".to_string()),
        serpapi_api_key: None,
    };
    let client = client_for(&mock_server, &credentials);
    let mut query = keyword_query(&[&["cultural bias"]], &["scopus"]);
    query.years = Some(YearFilter::range(2023, 2020));

    let result = client.search(&query, &NoProgress).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.papers.len(), 1);
    assert_eq!(result.papers[0].year, Some(2022));
    assert_eq!(
        result.query_log["Scopus"],
        "TITLE-ABS-KEY((\"cultural bias\")) AND PUBYEAR > 2019 AND PUBYEAR < 2024"
    );
}

#[tokio::test]
async fn test_scholar_sends_key_and_year_params() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("engine", "google_scholar"))
        .and(query_param("api_key", "serp-key"))
        .and(query_param("as_ylo", "2016"))
        .and(query_param("as_yhi", "2018"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"organic_results":[
                {"title":"Attention is all you need","link":"https://proceedings.neurips.cc/paper/7181",
                 "publication_info":{"summary":"A Vaswani, N Shazeer - Advances in neural information processing systems, 2017 - neurips.cc"}},
                {"title":"A 2019 follow-up","publication_info":{"summary":"X Y - Journal, 2019 - example.org"}}
            ]}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let credentials = Credentials {
        scopus_api_key: None,
        serpapi_api_key: Some("serp-key".to_string()),
    };
    let client = client_for(&mock_server, &credentials);
    let mut query = keyword_query(&[&["attention"]], &["google scholar"]);
    query.years = Some(YearFilter::range(2016, 2018));

    let result = client.search(&query, &NoProgress).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.papers.len(), 1);
    assert_eq!(result.papers[0].authors, vec!["A Vaswani", "N Shazeer"]);
}

#[tokio::test]
async fn test_unknown_source_is_reported() {
    let mock_server = MockServer::start().await;
    let client = client_for(&mock_server, &Credentials::default());
    let result = client
        .search(&keyword_query(&[&["x"]], &["Web of Science"]), &NoProgress)
        .await;

    assert!(result.papers.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].source, "Web of Science");
}

#[tokio::test]
async fn test_pipeline_resolves_cross_source_duplicates() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARXIV_FEED))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/publ/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DBLP_PUBLICATIONS))
        .mount(&mock_server)
        .await;

    let client = Arc::new(client_for(&mock_server, &Credentials::default()));
    let query = keyword_query(&[&["attention"], &["language"]], &["arXiv", "DBLP"]);

    let reports = Mutex::new(Vec::new());
    let progress = |fraction: f64, message: &str| {
        reports.lock().unwrap().push((fraction, message.to_string()));
    };

    let preferred = SearchTool::new(Arc::clone(&client), vec!["dblp".to_string()]);
    let outcome = preferred.search(query.clone(), &progress).await.unwrap();

    assert_eq!(outcome.total_found, 3);
    assert!(outcome.resolution.conflicts().is_empty());
    let papers = outcome.resolution.finalize(&Default::default()).unwrap();
    assert_eq!(papers.len(), 2);
    let attention = papers
        .iter()
        .find(|p| p.title.starts_with("Attention"))
        .unwrap();
    assert_eq!(attention.source, "DBLP");

    let fractions: Vec<f64> = reports.lock().unwrap().iter().map(|(f, _)| *f).collect();
    assert_eq!(fractions, vec![0.0, 0.5, 1.0]);

    let manual = SearchTool::new(client, Vec::new());
    let outcome = manual.search(query, &NoProgress).await.unwrap();
    assert_eq!(outcome.resolution.conflicts().len(), 1);
    let conflict = &outcome.resolution.conflicts()[0];
    assert_eq!(conflict.key, "attention is all you need");
    assert_eq!(conflict.papers[0].source, "arXiv");

    let choices = [(conflict.key.clone(), 1)].into_iter().collect();
    let papers = outcome.resolution.clone().finalize(&choices).unwrap();
    assert!(papers
        .iter()
        .any(|p| p.source == "DBLP" && p.title == "Attention is All you Need."));
}

fn enrichment_config(server: &MockServer) -> EnrichmentConfig {
    Config::for_testing(&server.uri())
        .enrichment
        .to_enrichment_config()
}

fn paper_with_url(title: &str, url: &str) -> Paper {
    let mut paper = Paper::new(title, "arXiv");
    paper.year = Some(2017);
    paper.url = Some(url.to_string());
    paper
}

#[tokio::test]
async fn test_enrichment_overlays_metadata() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/web"))
        .and(header("content-type", "text/plain"))
        .and(body_string("http://arxiv.org/abs/1706.03762v7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"itemType":"preprint","title":"Attention Is All You Need","date":"2017-06-12",
                "creators":[{"firstName":"Ashish","lastName":"Vaswani","creatorType":"author"}],
                "DOI":"10.48550/arXiv.1706.03762","url":"https://arxiv.org/abs/1706.03762v7"}]"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let coordinator = EnrichmentCoordinator::new(&enrichment_config(&mock_server)).unwrap();
    let enriched = coordinator
        .enrich(
            vec![paper_with_url("attention", "http://arxiv.org/pdf/1706.03762v7")],
            &NoProgress,
        )
        .await;

    assert_eq!(enriched.len(), 1);
    let paper = &enriched[0];
    assert!(paper.is_enriched());
    assert_eq!(paper.title(), "Attention Is All You Need");
    assert_eq!(paper.doi(), Some("10.48550/arXiv.1706.03762"));
    assert_eq!(paper.authors(), vec!["Ashish Vaswani"]);
    assert_eq!(paper.paper().title, "attention");
}

#[tokio::test]
async fn test_enrichment_failures_keep_original_papers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string("https://example.org/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string("https://example.org/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string("https://example.org/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("translator crashed"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string("https://example.org/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"title":"Too Late"}]"#)
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string("https://example.org/ok"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"[{"title":"Standardized Title","date":"March 2019"}]"#),
        )
        .mount(&mock_server)
        .await;

    let mut config = enrichment_config(&mock_server);
    config.timeout = Duration::from_secs(1);
    let coordinator = EnrichmentCoordinator::new(&config).unwrap();

    let papers = vec![
        paper_with_url("Missing", "https://example.org/missing"),
        paper_with_url("Empty", "https://example.org/empty"),
        paper_with_url("Broken", "https://example.org/broken"),
        paper_with_url("Slow", "https://example.org/slow"),
        paper_with_url("Ok", "https://example.org/ok"),
        paper_with_url("Direct", "https://example.org/paper.pdf"),
    ];

    let reports = Mutex::new(Vec::new());
    let progress = |fraction: f64, _: &str| reports.lock().unwrap().push(fraction);
    let enriched = coordinator.enrich(papers, &progress).await;

    let titles: Vec<&str> = enriched.iter().map(EnrichedPaper::title).collect();
    assert_eq!(
        titles,
        vec!["Missing", "Empty", "Broken", "Slow", "Standardized Title", "Direct"]
    );
    assert_eq!(enriched.iter().filter(|p| p.is_enriched()).count(), 1);
    assert_eq!(enriched[4].year(), Some(2019));
    assert_eq!(enriched[0].year(), Some(2017));

    let fractions = reports.into_inner().unwrap();
    assert_eq!(fractions.len(), 6);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!((fractions[5] - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_cancelled_enrichment_returns_every_paper() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"title":"Never Seen"}]"#)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let coordinator = EnrichmentCoordinator::new(&enrichment_config(&mock_server)).unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let papers: Vec<Paper> = (0..6)
        .map(|i| paper_with_url(&format!("Paper {i}"), &format!("https://example.org/{i}")))
        .collect();
    let enriched = coordinator.enrich_until(papers, &NoProgress, &cancel).await;

    assert_eq!(enriched.len(), 6);
    assert!(enriched.iter().all(|p| !p.is_enriched()));
    assert_eq!(enriched[3].title(), "Paper 3");
}

const TRANSLATE_DELAY: Duration = Duration::from_millis(300);

/// Answers every translation request after a fixed delay, noting when each arrived
struct ArrivalRecorder {
    arrivals: Arc<Mutex<Vec<std::time::Instant>>>,
}

impl Respond for ArrivalRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(std::time::Instant::now());
        ResponseTemplate::new(200)
            .set_body_string(r#"[{"title":"Translated"}]"#)
            .set_delay(TRANSLATE_DELAY)
    }
}

#[tokio::test]
async fn test_enrichment_respects_worker_cap() {
    let mock_server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("POST"))
        .and(path("/web"))
        .respond_with(ArrivalRecorder {
            arrivals: Arc::clone(&arrivals),
        })
        .expect(10)
        .mount(&mock_server)
        .await;

    let mut config = enrichment_config(&mock_server);
    config.max_concurrent = 2;
    let coordinator = EnrichmentCoordinator::new(&config).unwrap();

    let papers: Vec<Paper> = (0..10)
        .map(|i| paper_with_url(&format!("Paper {i}"), &format!("https://example.org/{i}")))
        .collect();
    let started = std::time::Instant::now();
    let enriched = coordinator.enrich(papers, &NoProgress).await;

    assert_eq!(enriched.len(), 10);
    assert!(enriched.iter().all(EnrichedPaper::is_enriched));
    assert!(started.elapsed() >= TRANSLATE_DELAY * 5);

    // A request is in flight for at least the delay after it arrives
    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    let peak = arrivals
        .iter()
        .map(|&at| {
            arrivals
                .iter()
                .filter(|&&other| other <= at && at.duration_since(other) < TRANSLATE_DELAY)
                .count()
        })
        .max()
        .unwrap_or(0);
    assert_eq!(arrivals.len(), 10);
    assert!((1..=2).contains(&peak), "{peak} requests in flight");
}
