mod hub_tests;
