use cohere_stream_filter::parsing::Filter;
use cohere_stream_filter::parsing::{self, FilterOptions, new_filter};
use cohere_stream_filter::stream::StreamFilter;
use cohere_stream_filter::{Detokenizer, MelodyError, TokenIdsWithLogProb};

fn main() {
    env_logger::init();

    println!("=== Basic filter: trimming only ===");
    {
        let options = FilterOptions::new().with_left_trimmed().with_right_trimmed();
        let mut filter = new_filter(options);

        let outputs = filter.write_decoded("  Hello World!  ", TokenIdsWithLogProb::new());
        for output in outputs {
            println!("  text: {:?}", output.text);
        }
    }

    println!("\n=== Command 3: citations ===");
    {
        let options = FilterOptions::new().cmd3();
        let mut filter = new_filter(options);

        let outputs = filter.write_decoded(
            "<|START_RESPONSE|>Hello <co>world</co: 0:[1]>!<|END_RESPONSE|>",
            TokenIdsWithLogProb::new(),
        );
        for output in outputs {
            println!("  text: {:?}", output.text);
            for citation in &output.citations {
                println!(
                    "    citation {:?} at [{}, {}) sources={:?}",
                    citation.text, citation.start_index, citation.end_index, citation.sources
                );
            }
        }
    }

    println!("\n=== Search query ===");
    {
        let options = FilterOptions::new().handle_search_query();
        let mut filter = new_filter(options);

        let outputs = filter.write_decoded("Search: melody parsing", TokenIdsWithLogProb::new());
        for output in outputs {
            if let Some(query) = output.search_query {
                println!("  query[{}]: {:?}", query.index, query.text);
            }
        }
    }

    println!("\n=== Stop sequences ===");
    {
        let options = FilterOptions::new().with_inclusive_stops(vec!["<|END|>".to_string()]);
        let mut filter = new_filter(options);

        let outputs = filter.write_decoded("Hello world<|END|>", TokenIdsWithLogProb::new());
        for output in outputs {
            println!("  text: {:?}", output.text);
        }
    }

    println!("\n=== Token-id ingress with a toy detokenizer ===");
    {
        struct AsciiDetokenizer;
        impl Detokenizer for AsciiDetokenizer {
            fn decode(&self, token_ids: &[u32], _skip_special_tokens: bool) -> Result<String, MelodyError> {
                Ok(token_ids.iter().map(|&id| (id as u8) as char).collect())
            }
        }

        let filter = new_filter(FilterOptions::new());
        let mut ingress = parsing::ingress::IngressFilter::new(filter, AsciiDetokenizer);

        for &token in b"Hello!" {
            if let Ok(outputs) = ingress.write(u32::from(token), None) {
                for output in outputs {
                    print!("{}", output.text);
                }
            }
        }
        println!();
        println!("  raw tokens seen: {:?}", ingress.raw_tokens());
    }

    println!("\n=== Threaded stream wrapper ===");
    {
        let filter = new_filter(FilterOptions::new());
        let mut stream = StreamFilter::new(filter);

        stream.write_decoded("Hello", TokenIdsWithLogProb::new());
        stream.write_decoded(", streamed!", TokenIdsWithLogProb::new());
        stream.close();

        // Worker thread has already exited; the channel yields any
        // remaining buffered output and then disconnects.
        let rx_text: String = {
            let mut collected = String::new();
            while let Ok(output) = stream.read().recv_timeout(std::time::Duration::from_millis(200)) {
                collected.push_str(&output.text);
            }
            collected
        };
        println!("  collected: {rx_text:?}");
    }

    println!("\n=== Examples complete ===");
}
