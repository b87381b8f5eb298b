use webserv::config::HttpConfig;
use webserv::http::Method;

const VALID: &str = "
http {
	server_timeout_time 1000

	# first virtual host
	server {
		listen 8080
		server_name alpha
		root ./www
		index index.html
		max_body_size 2048
		directory_listing true
		keepalive_timeout 5
		send_timeout 10

		location / {
			request_types GET POST DELETE
		}
		location /old {
			request_types GET
			redirection example.com/new
		}
	}

	server {
		listen 8080
		server_name beta
		root ./beta
		index home.html
	}
}
";

#[test]
fn parses_a_full_config() {
    let config = HttpConfig::parse_str(VALID).expect("config should parse");

    assert_eq!(config.poll_timeout_ms, 1000);
    assert_eq!(config.servers.len(), 2);

    let alpha = &config.servers[0];
    assert_eq!(alpha.listen_port, 8080);
    assert_eq!(alpha.server_name, "alpha");
    assert_eq!(alpha.root_directory.to_str(), Some("./www"));
    assert_eq!(alpha.index_file, "index.html");
    assert_eq!(alpha.client_max_body_size, 2048);
    assert!(alpha.directory_listing);
    assert_eq!(alpha.keep_alive_timeout, 5);
    assert_eq!(alpha.send_timeout, 10);

    assert_eq!(alpha.locations.len(), 2);
    assert_eq!(alpha.locations[0].path_prefix, "/");
    assert_eq!(
        alpha.locations[0].allowed_methods,
        vec![Method::Get, Method::Post, Method::Delete]
    );
    assert_eq!(alpha.locations[0].redirection, None);
    assert_eq!(
        alpha.locations[1].redirection.as_deref(),
        Some("example.com/new")
    );
}

#[test]
fn defaults_apply_when_optional_directives_are_omitted() {
    let beta = &HttpConfig::parse_str(VALID).unwrap().servers[1];
    assert_eq!(beta.client_max_body_size, 1_048_576);
    assert!(!beta.directory_listing);
    assert_eq!(beta.keep_alive_timeout, 15);
    assert_eq!(beta.send_timeout, 30);
    assert!(beta.locations.is_empty());
}

#[test]
fn ports_and_candidates_are_exposed_in_definition_order() {
    let config = HttpConfig::parse_str(VALID).unwrap();
    assert_eq!(config.listen_ports(), vec![8080]);

    let candidates = config.servers_for_port(8080);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].server_name, "alpha"); // the default server
    assert!(config.servers_for_port(81).is_empty());
}

fn err_of(input: &str) -> String {
    format!("{}", HttpConfig::parse_str(input).unwrap_err())
}

#[test]
fn unknown_directive_is_fatal() {
    let err = err_of(
        "http {\n server_timeout_time 5\n server {\n listen 80\n server_name a\n \
         root ./www\n index i.html\n fancy_pants on\n }\n }\n",
    );
    assert!(err.contains("Unknown server directive 'fancy_pants'"), "{err}");
    assert!(err.contains("line 8"), "{err}");
}

#[test]
fn duplicate_directive_is_fatal() {
    let err = err_of(
        "http {\n server_timeout_time 5\n server {\n listen 80\n listen 81\n \
         server_name a\n root ./www\n index i.html\n }\n }\n",
    );
    assert!(err.contains("Duplicate directive 'listen'"), "{err}");
}

#[test]
fn duplicate_location_prefix_is_fatal() {
    let err = err_of(
        "http {\n server_timeout_time 5\n server {\n listen 80\n server_name a\n \
         root ./www\n index i.html\n location /up {\n request_types GET\n }\n \
         location /up {\n request_types POST\n }\n }\n }\n",
    );
    assert!(err.contains("Duplicate location prefix '/up'"), "{err}");
}

#[test]
fn missing_required_fields_are_listed() {
    let err = err_of(
        "http {\n server_timeout_time 5\n server {\n listen 80\n index i.html\n }\n }\n",
    );
    assert!(err.contains("missing required elements"), "{err}");
    assert!(err.contains("server_name"), "{err}");
    assert!(err.contains("root"), "{err}");
    assert!(!err.contains(" listen"), "{err}");
}

#[test]
fn missing_server_timeout_time_is_fatal() {
    let err = err_of(
        "http {\n server {\n listen 80\n server_name a\n root ./www\n index i.html\n }\n }\n",
    );
    assert!(err.contains("missing 'server_timeout_time'"), "{err}");
}

#[test]
fn missing_closing_brace_is_fatal() {
    let err = err_of("http {\n server_timeout_time 5\n server {\n listen 80\n");
    assert!(err.contains("missing closing brace"), "{err}");
}

#[test]
fn invalid_port_is_fatal() {
    let err = err_of(
        "http {\n server_timeout_time 5\n server {\n listen 70000\n server_name a\n \
         root ./www\n index i.html\n }\n }\n",
    );
    assert!(err.contains("Invalid port 70000"), "{err}");
}

#[test]
fn unsupported_request_type_is_fatal() {
    let err = err_of(
        "http {\n server_timeout_time 5\n server {\n listen 80\n server_name a\n \
         root ./www\n index i.html\n location / {\n request_types PATCH\n }\n }\n }\n",
    );
    assert!(err.contains("Unsupported request type: PATCH"), "{err}");
}

#[test]
fn a_config_without_servers_is_fatal() {
    let err = err_of("http {\n server_timeout_time 5\n }\n");
    assert!(err.contains("does not define any server"), "{err}");
}

#[test]
fn content_outside_the_http_section_is_fatal() {
    let err = err_of("http {\n server_timeout_time 5\n server {\n listen 80\n \
                      server_name a\n root ./www\n index i.html\n }\n }\n stray\n");
    assert!(err.contains("after http section"), "{err}");
}
